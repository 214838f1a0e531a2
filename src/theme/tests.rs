//! Tests for the template engine

use super::*;
use chrono::Utc;
use std::fs;
use tempfile::TempDir;
use tera::Context as TeraContext;

fn base_context() -> TeraContext {
    let mut context = TeraContext::new();
    context.insert("user", &Option::<()>::None);
    context.insert("csrf_token", "token123");
    context.insert("request_path", "/");
    context
}

#[test]
fn test_embedded_templates_are_loaded() {
    let dir = TempDir::new().unwrap();
    let engine = TemplateEngine::new(&dir.path().join("missing")).unwrap();

    for name in [
        "base.html",
        "blog/index.html",
        "blog/detail.html",
        "blog/create.html",
        "registration/login.html",
        "pages/404.html",
        "pages/403csrf.html",
    ] {
        assert!(engine.has_template(name), "{} should be embedded", name);
    }
}

#[test]
fn test_disk_template_overrides_embedded() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("pages")).unwrap();
    fs::write(
        dir.path().join("pages/about.html"),
        "{% extends \"base.html\" %}{% block content %}Custom about{% endblock %}",
    )
    .unwrap();

    let engine = TemplateEngine::new(dir.path()).unwrap();
    let html = engine.render("pages/about.html", &base_context()).unwrap();
    assert!(html.contains("Custom about"));
    assert!(html.contains("<title>"));
}

#[test]
fn test_render_index_page() {
    let dir = TempDir::new().unwrap();
    let engine = TemplateEngine::new(dir.path()).unwrap();

    let mut context = base_context();
    context.insert(
        "page_obj",
        &serde_json::json!({
            "items": [{
                "id": 7,
                "title": "Горы <Кавказа>",
                "text": "Первая строка\nвторая",
                "pub_date": Utc::now(),
                "is_published": true,
                "image": null,
                "author_id": 1,
                "category_id": null,
                "location_id": null,
                "created_at": Utc::now(),
                "author_username": "ivan",
                "category": null,
                "location": {"id": 1, "name": "Скрытое место", "is_published": false},
                "comment_count": 2
            }],
            "number": 1,
            "num_pages": 1,
            "total": 1,
            "per_page": 10,
            "has_next": false,
            "has_previous": false,
            "next_page_number": null,
            "previous_page_number": null
        }),
    );

    let html = engine.render("blog/index.html", &context).unwrap();
    assert!(html.contains("Горы &lt;Кавказа&gt;"));
    assert!(html.contains("Первая строка<br>вторая"));
    assert!(html.contains("/posts/7/"));
    assert!(html.contains("Комментарии (2)"));
    assert!(!html.contains("Скрытое место"));
}

#[test]
fn test_linebreaksbr_escapes_before_breaking() {
    let engine = TemplateEngine::from_templates(vec![(
        "t.html".to_string(),
        "{{ text | linebreaksbr | safe }}".to_string(),
    )])
    .unwrap();

    let mut context = TeraContext::new();
    context.insert("text", "<b>bold</b>\r\nnext");
    let html = engine.render("t.html", &context).unwrap();
    assert_eq!(html, "&lt;b&gt;bold&lt;&#x2F;b&gt;<br>next");
}

#[test]
fn test_missing_template_is_error_and_fallback_renders() {
    let engine = TemplateEngine::from_templates(Vec::new()).unwrap();
    assert!(engine.render("nope.html", &TeraContext::new()).is_err());

    let html = engine.render_with_fallback("nope.html", &TeraContext::new(), "Ошибка 500");
    assert!(html.contains("<h1>Ошибка 500</h1>"));
}

#[test]
fn test_broken_override_is_reported() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("broken.html"), "{% if %}").unwrap();
    assert!(TemplateEngine::new(dir.path()).is_err());
}
