//! Server-rendered pages
//!
//! Templates only present data that handlers already fetched.

use crate::infrastructure::entities::Companion;
use log::error;
use minijinja::{Environment, Value, context};
use serde::Serialize;
use std::sync::LazyLock;

pub const SUBJECTS: [&str; 6] = ["maths", "language", "science", "history", "coding", "economics"];

const FALLBACK_COLOR: &str = "#888888";

const TEMPLATES: [(&str, &str); 7] = [
    ("base.html", include_str!("../../templates/base.html")),
    ("macros.html", include_str!("../../templates/macros.html")),
    ("home.html", include_str!("../../templates/home.html")),
    ("companions.html", include_str!("../../templates/companions.html")),
    ("companion.html", include_str!("../../templates/companion.html")),
    ("my_journey.html", include_str!("../../templates/my_journey.html")),
    ("error.html", include_str!("../../templates/error.html")),
];

static ENVIRONMENT: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();
    env.add_filter("subject_color", subject_color);
    for (name, source) in TEMPLATES {
        if let Err(e) = env.add_template(name, source) {
            error!("failed to load template {name}: {e}");
        }
    }
    env
});

/// Card background for a subject.
pub fn subject_color(subject: &str) -> String {
    match subject.to_lowercase().as_str() {
        "science" => "#E5D0FF",
        "maths" => "#FFDA6E",
        "language" => "#BDE7FF",
        "coding" => "#FFC8E4",
        "history" => "#FFECC8",
        "economics" => "#C8FFDF",
        _ => FALLBACK_COLOR,
    }
    .to_owned()
}

/// Who is looking at the page, as far as templates care.
#[derive(Debug, Clone, Serialize)]
pub struct Viewer {
    pub id: String,
    pub bookmarks: Vec<String>,
}

impl Viewer {
    pub fn new(id: impl Into<String>, bookmarked: &[Companion]) -> Viewer {
        Viewer {
            id: id.into(),
            bookmarks: bookmarked.iter().map(|c| c.id.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LibraryPage {
    pub companions: Vec<Companion>,
    pub subject: String,
    pub topic: String,
    pub page: u32,
    pub has_next: bool,
}

fn render(name: &str, ctx: Value) -> Result<String, minijinja::Error> {
    ENVIRONMENT.get_template(name)?.render(ctx)
}

pub fn home(
    viewer: Option<&Viewer>,
    popular: &[Companion],
    recent: &[Companion],
) -> Result<String, minijinja::Error> {
    render(
        "home.html",
        context! { viewer, popular, recent, path => "/" },
    )
}

pub fn library(viewer: Option<&Viewer>, page: &LibraryPage) -> Result<String, minijinja::Error> {
    render(
        "companions.html",
        context! {
            viewer,
            subjects => SUBJECTS,
            path => "/companions",
            ..Value::from_serialize(page)
        },
    )
}

pub fn companion(viewer: Option<&Viewer>, companion: &Companion) -> Result<String, minijinja::Error> {
    render(
        "companion.html",
        context! {
            viewer,
            companion,
            path => format!("/companions/{}", companion.id),
        },
    )
}

pub fn my_journey(
    viewer: &Viewer,
    companions: &[Companion],
    sessions: &[Companion],
    bookmarked: &[Companion],
) -> Result<String, minijinja::Error> {
    render(
        "my_journey.html",
        context! {
            viewer,
            companions,
            sessions,
            bookmarked,
            path => "/my-journey",
        },
    )
}

pub fn error_page(status: u16, message: &str) -> Result<String, minijinja::Error> {
    render("error.html", context! { status, message })
}
