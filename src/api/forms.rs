//! HTML form parsing
//!
//! Forms arrive either urlencoded (comments, profile, auth) or as
//! multipart (the post form, which carries an image). Each form type keeps
//! the raw values so a rejected submission can be shown again as typed.

use axum::extract::Multipart;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Post, PostInput, UpdateProfileInput};
use crate::services::{ChangePasswordInput, FieldErrors, ImageUpload, LoginInput, RegisterInput};

/// Format used by `<input type="datetime-local">`
pub const DATETIME_LOCAL_FORMAT: &str = "%Y-%m-%dT%H:%M";

const ACCEPTED_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
];

const REQUIRED: &str = "This field is required.";
const INVALID_DATETIME: &str = "Enter a valid date/time.";
const INVALID_CHOICE: &str = "Select a valid choice. That choice is not one of the available choices.";

pub fn format_datetime_local(value: DateTime<Utc>) -> String {
    value.format(DATETIME_LOCAL_FORMAT).to_string()
}

/// Parse a form date-time, read as UTC.
pub fn parse_datetime_local(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    ACCEPTED_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

/// Values of the post form as shown in the template
#[derive(Debug, Clone, Default, Serialize)]
pub struct PostForm {
    pub title: String,
    pub text: String,
    pub pub_date: String,
    pub is_published: bool,
    pub category: Option<i64>,
    pub location: Option<i64>,
    /// Image already attached to the post being edited
    pub current_image: Option<String>,
}

impl PostForm {
    /// Empty form for a new post, published now by default
    pub fn blank(now: DateTime<Utc>) -> Self {
        Self {
            pub_date: format_datetime_local(now),
            is_published: true,
            ..Self::default()
        }
    }

    pub fn from_post(post: &Post) -> Self {
        Self {
            title: post.title.clone(),
            text: post.text.clone(),
            pub_date: format_datetime_local(post.pub_date),
            is_published: post.is_published,
            category: post.category_id,
            location: post.location_id,
            current_image: post.image.clone(),
        }
    }
}

/// A submitted post form
#[derive(Debug, Default)]
pub struct PostSubmission {
    pub form: PostForm,
    /// Problems found while parsing, before any service validation
    pub errors: FieldErrors,
    pub image: Option<ImageUpload>,
    /// The "clear" box next to the current image was ticked
    pub clear_image: bool,
    pub pub_date: Option<DateTime<Utc>>,
}

impl PostSubmission {
    /// Read every field of the multipart post form.
    pub async fn read(mut multipart: Multipart) -> Self {
        let mut submission = Self::default();
        let mut raw_category = String::new();
        let mut raw_location = String::new();

        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Failed to read multipart field: {}", e);
                    break;
                }
            };

            let name = field.name().unwrap_or("").to_string();
            if name == "image" {
                let filename = field.file_name().unwrap_or("").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                match field.bytes().await {
                    // Browsers send an empty part when no file was chosen.
                    Ok(data) if filename.is_empty() && data.is_empty() => {}
                    Ok(data) => {
                        submission.image = Some(ImageUpload {
                            filename,
                            content_type,
                            data: data.to_vec(),
                        })
                    }
                    Err(e) => {
                        tracing::warn!("Failed to read uploaded image: {}", e);
                        submission.errors.add("image", "The submitted file could not be read.");
                    }
                }
                continue;
            }

            let value = match field.text().await {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!("Failed to read form field {}: {}", name, e);
                    continue;
                }
            };
            match name.as_str() {
                "title" => submission.form.title = value,
                "text" => submission.form.text = value,
                "pub_date" => submission.form.pub_date = value,
                "category" => raw_category = value,
                "location" => raw_location = value,
                "is_published" => submission.form.is_published = is_checked(&value),
                "image-clear" => submission.clear_image = is_checked(&value),
                _ => {}
            }
        }

        submission.form.category = parse_choice(&mut submission.errors, "category", &raw_category);
        submission.form.location = parse_choice(&mut submission.errors, "location", &raw_location);

        if submission.form.pub_date.trim().is_empty() {
            submission.errors.add("pub_date", REQUIRED);
        } else {
            submission.pub_date = parse_datetime_local(&submission.form.pub_date);
            if submission.pub_date.is_none() {
                submission.errors.add("pub_date", INVALID_DATETIME);
            }
        }

        submission
    }

    /// Post fields with `image` as the stored image, unless parsing failed.
    pub fn input(&self, image: Option<String>) -> Result<PostInput, FieldErrors> {
        let pub_date = match self.pub_date {
            Some(pub_date) if self.errors.is_empty() => pub_date,
            _ => return Err(self.errors.clone()),
        };
        Ok(PostInput {
            title: self.form.title.clone(),
            text: self.form.text.clone(),
            pub_date,
            is_published: self.form.is_published,
            category_id: self.form.category,
            location_id: self.form.location,
            image,
        })
    }
}

fn is_checked(value: &str) -> bool {
    !matches!(value.trim(), "" | "0" | "off" | "false")
}

fn parse_choice(errors: &mut FieldErrors, field: &str, raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<i64>() {
        Ok(id) => Some(id),
        Err(_) => {
            errors.add(field, INVALID_CHOICE);
            None
        }
    }
}

/// Comment text, for adding and editing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommentForm {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
}

impl From<ProfileForm> for UpdateProfileInput {
    fn from(form: ProfileForm) -> Self {
        Self {
            username: form.username,
            first_name: form.first_name,
            last_name: form.last_name,
            email: form.email,
        }
    }
}

impl From<UpdateProfileInput> for ProfileForm {
    fn from(input: UpdateProfileInput) -> Self {
        Self {
            username: input.username,
            first_name: input.first_name,
            last_name: input.last_name,
            email: input.email,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrationForm {
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password1: String,
    #[serde(default, skip_serializing)]
    pub password2: String,
}

impl From<RegistrationForm> for RegisterInput {
    fn from(form: RegistrationForm) -> Self {
        RegisterInput::new(form.username, form.password1, form.password2)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default)]
    pub next: Option<String>,
}

impl LoginForm {
    pub fn to_input(&self) -> LoginInput {
        LoginInput::new(self.username.clone(), self.password.clone())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PasswordChangeForm {
    #[serde(default, skip_serializing)]
    pub old_password: String,
    #[serde(default, skip_serializing)]
    pub new_password1: String,
    #[serde(default, skip_serializing)]
    pub new_password2: String,
}

impl From<PasswordChangeForm> for ChangePasswordInput {
    fn from(form: PasswordChangeForm) -> Self {
        Self {
            old_password: form.old_password,
            new_password1: form.new_password1,
            new_password2: form.new_password2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, extract::FromRequest, http::Request};
    use chrono::TimeZone;

    async fn multipart(parts: &[(&str, &str)], image: Option<(&str, &str, &[u8])>) -> Multipart {
        let mut body = Vec::new();
        for (name, value) in parts {
            body.extend_from_slice(
                format!(
                    "--BOUNDARY\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    name, value
                )
                .as_bytes(),
            );
        }
        if let Some((filename, content_type, data)) = image {
            body.extend_from_slice(
                format!(
                    "--BOUNDARY\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                    filename, content_type
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(b"--BOUNDARY--\r\n");

        let request = Request::builder()
            .method("POST")
            .header("content-type", "multipart/form-data; boundary=BOUNDARY")
            .body(Body::from(body))
            .unwrap();
        Multipart::from_request(request, &()).await.unwrap()
    }

    #[test]
    fn test_parse_datetime_local() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_datetime_local("2024-03-01T12:30"), Some(expected));
        assert_eq!(parse_datetime_local("2024-03-01 12:30:00"), Some(expected));
        assert_eq!(parse_datetime_local("01.03.2024"), None);
        assert_eq!(format_datetime_local(expected), "2024-03-01T12:30");
    }

    #[tokio::test]
    async fn test_read_complete_submission() {
        let form = multipart(
            &[
                ("csrfmiddlewaretoken", "tok"),
                ("title", "Горы"),
                ("text", "Текст"),
                ("pub_date", "2024-03-01T12:30"),
                ("category", "3"),
                ("location", ""),
                ("is_published", "on"),
            ],
            Some(("photo.png", "image/png", b"\x89PNG")),
        )
        .await;

        let submission = PostSubmission::read(form).await;
        assert!(submission.errors.is_empty(), "{}", submission.errors);
        assert_eq!(submission.form.category, Some(3));
        assert_eq!(submission.form.location, None);
        assert!(submission.form.is_published);
        assert!(!submission.clear_image);

        let image = submission.image.as_ref().unwrap();
        assert_eq!(image.filename, "photo.png");
        assert_eq!(image.content_type, "image/png");

        let input = submission.input(Some("posts_images/x.png".to_string())).unwrap();
        assert_eq!(input.title, "Горы");
        assert_eq!(input.category_id, Some(3));
        assert_eq!(input.image.as_deref(), Some("posts_images/x.png"));
    }

    #[tokio::test]
    async fn test_unchecked_box_means_unpublished() {
        let form = multipart(
            &[("title", "t"), ("text", "x"), ("pub_date", "2024-03-01T12:30")],
            None,
        )
        .await;
        let submission = PostSubmission::read(form).await;
        assert!(!submission.form.is_published);
        assert!(submission.image.is_none());
        assert!(!submission.input(None).unwrap().is_published);
    }

    #[tokio::test]
    async fn test_empty_file_part_is_no_image() {
        let form = multipart(
            &[("title", "t"), ("text", "x"), ("pub_date", "2024-03-01T12:30")],
            Some(("", "application/octet-stream", b"")),
        )
        .await;
        assert!(PostSubmission::read(form).await.image.is_none());
    }

    #[tokio::test]
    async fn test_bad_date_and_choice_are_field_errors() {
        let form = multipart(
            &[
                ("title", "t"),
                ("text", "x"),
                ("pub_date", "tomorrow"),
                ("category", "abc"),
            ],
            None,
        )
        .await;
        let submission = PostSubmission::read(form).await;
        assert_eq!(submission.errors.get("pub_date"), [INVALID_DATETIME]);
        assert_eq!(submission.errors.get("category"), [INVALID_CHOICE]);
        assert!(submission.input(None).is_err());
    }

    #[tokio::test]
    async fn test_missing_date_is_required() {
        let form = multipart(&[("title", "t"), ("text", "x")], None).await;
        let submission = PostSubmission::read(form).await;
        assert_eq!(submission.errors.get("pub_date"), [REQUIRED]);
    }

    #[test]
    fn test_post_form_from_post() {
        let post = Post::new(
            1,
            PostInput {
                title: "T".to_string(),
                text: "X".to_string(),
                pub_date: Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap(),
                is_published: false,
                category_id: Some(2),
                location_id: None,
                image: Some("posts_images/a.jpg".to_string()),
            },
        );
        let form = PostForm::from_post(&post);
        assert_eq!(form.pub_date, "2030-01-02T03:04");
        assert_eq!(form.category, Some(2));
        assert_eq!(form.current_image.as_deref(), Some("posts_images/a.jpg"));
        assert!(!form.is_published);
    }

    #[test]
    fn test_password_fields_are_not_echoed() {
        let form = RegistrationForm {
            username: "ivan".to_string(),
            password1: "secret-one".to_string(),
            password2: "secret-one".to_string(),
        };
        let json = serde_json::to_string(&form).unwrap();
        assert!(json.contains("ivan"));
        assert!(!json.contains("secret-one"));
    }
}
