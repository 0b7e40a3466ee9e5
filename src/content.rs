//! Typed records for the portfolio's content tables and a repository that
//! reads and writes them through any [`RowStore`].
//!
//! Rows are decoded and validated once, at the store boundary. A row that
//! does not fit its record type is reported as
//! [`FolioError::InvalidRecord`] instead of travelling further as loose
//! JSON.

use crate::error::FolioError;
use crate::markup;
use crate::store::{Filter, Order, Query, RowStore};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// A row type that can check itself after decoding.
pub trait Record: DeserializeOwned {
    fn validate(&self) -> Result<(), String>;
}

/// Row ids arrive as strings (UUID) or integers depending on the table;
/// both are kept as text.
fn id_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Int(i64),
    }
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Int(n) => n.to_string(),
    })
}

/// Nullable columns decode to the field's default instead of failing.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn require(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("'{}' is empty", field))
    } else {
        Ok(())
    }
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
pub fn parse_technologies(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

// ── Projects ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(deserialize_with = "id_text")]
    pub id: String,
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub project_url: Option<String>,
    #[serde(default)]
    pub github_url: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub technologies: Vec<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Record for Project {
    fn validate(&self) -> Result<(), String> {
        require("id", &self.id)?;
        require("title", &self.title)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewProject {
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub project_url: Option<String>,
    pub github_url: Option<String>,
    pub category: String,
    pub technologies: Vec<String>,
}

impl NewProject {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    /// Set technologies from form input such as `"rust, tokio,,serde "`.
    pub fn technologies_csv(mut self, csv: &str) -> Self {
        self.technologies = parse_technologies(csv);
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        require("title", &self.title)
    }
}

// ── Blog posts ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogPost {
    #[serde(deserialize_with = "id_text")]
    pub id: String,
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub mini_description: Option<String>,
    /// Body in the markup dialect of [`crate::markup`].
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub read_time: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl BlogPost {
    /// The body as sanitized HTML, ready to display.
    pub fn body_html(&self) -> String {
        markup::render_safe(&self.description)
    }
}

impl Record for BlogPost {
    fn validate(&self) -> Result<(), String> {
        require("id", &self.id)?;
        require("title", &self.title)?;
        require("slug", &self.slug)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewBlogPost {
    pub title: String,
    pub slug: String,
    pub mini_description: String,
    pub description: String,
    pub image_url: Option<String>,
    pub category: String,
    pub read_time: String,
}

impl NewBlogPost {
    pub fn validate(&self) -> Result<(), String> {
        require("title", &self.title)?;
        require("slug", &self.slug)?;
        if self.slug.chars().any(char::is_whitespace) {
            return Err(format!("slug '{}' contains whitespace", self.slug));
        }
        Ok(())
    }
}

// ── Skills ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    #[serde(deserialize_with = "id_text")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

impl Record for Skill {
    fn validate(&self) -> Result<(), String> {
        require("id", &self.id)?;
        require("name", &self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewSkill {
    pub name: String,
    pub category: String,
    pub icon: String,
}

impl NewSkill {
    pub fn validate(&self) -> Result<(), String> {
        require("name", &self.name)
    }
}

// ── Experience ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    #[serde(deserialize_with = "id_text")]
    pub id: String,
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_date: String,
    /// Empty or missing while the position is current.
    #[serde(default)]
    pub end_date: Option<String>,
}

impl Experience {
    pub fn is_current(&self) -> bool {
        self.end_date.as_deref().map_or(true, |d| d.trim().is_empty())
    }
}

fn check_date(field: &str, value: &str) -> Result<(), String> {
    let day = value.get(..10).unwrap_or(value);
    chrono::NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| format!("'{}' is not a YYYY-MM-DD date: '{}'", field, value))
}

impl Record for Experience {
    fn validate(&self) -> Result<(), String> {
        require("id", &self.id)?;
        require("title", &self.title)?;
        require("company", &self.company)?;
        check_date("start_date", &self.start_date)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewExperience {
    pub title: String,
    pub company: String,
    pub description: String,
    pub start_date: String,
    pub end_date: String,
}

impl NewExperience {
    pub fn validate(&self) -> Result<(), String> {
        require("title", &self.title)?;
        require("company", &self.company)?;
        check_date("start_date", &self.start_date)?;
        if !self.end_date.trim().is_empty() {
            check_date("end_date", &self.end_date)?;
        }
        Ok(())
    }
}

// ── Contact messages ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactMessage {
    #[serde(deserialize_with = "id_text")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub message: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_processed: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl ContactMessage {
    /// Case-insensitive substring match over name, email and message.
    pub fn matches(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        [&self.name, &self.email, &self.message]
            .iter()
            .any(|f| f.to_lowercase().contains(&needle))
    }
}

impl Record for ContactMessage {
    fn validate(&self) -> Result<(), String> {
        require("id", &self.id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewContactMessage {
    pub name: String,
    pub email: String,
    pub message: String,
}

impl NewContactMessage {
    pub fn new(name: impl Into<String>, email: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            message: message.into(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        require("name", &self.name)?;
        require("email", &self.email)?;
        require("message", &self.message)
    }
}

/// Which messages to list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFilter {
    #[default]
    All,
    Processed,
    Unprocessed,
}

// ── Site info ────────────────────────────────────────────────────────────

/// The single row of site-wide contact details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteInfo {
    #[serde(deserialize_with = "id_text")]
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub github_url: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub twitter_url: Option<String>,
    #[serde(default)]
    pub instagram_url: Option<String>,
    #[serde(default)]
    pub cv_url: Option<String>,
}

impl Record for SiteInfo {
    fn validate(&self) -> Result<(), String> {
        require("id", &self.id)
    }
}

/// An editable column of [`SiteInfo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteInfoField {
    Email,
    Phone,
    Address,
    GithubUrl,
    LinkedinUrl,
    TwitterUrl,
    InstagramUrl,
    CvUrl,
}

impl SiteInfoField {
    pub fn column(self) -> &'static str {
        match self {
            SiteInfoField::Email => "email",
            SiteInfoField::Phone => "phone",
            SiteInfoField::Address => "address",
            SiteInfoField::GithubUrl => "github_url",
            SiteInfoField::LinkedinUrl => "linkedin_url",
            SiteInfoField::TwitterUrl => "twitter_url",
            SiteInfoField::InstagramUrl => "instagram_url",
            SiteInfoField::CvUrl => "cv_url",
        }
    }
}

// ── Repository ───────────────────────────────────────────────────────────

/// Table names used by [`ContentRepository`].
///
/// Every field is public, so a schema whose names do not follow one prefix
/// can override them one at a time:
///
/// ```
/// use folio_kit::TableNames;
///
/// let tables = TableNames {
///     experience: "sitedeneyim".into(),
///     ..TableNames::with_prefix("site")
/// };
/// assert_eq!(tables.projects, "siteprojects");
/// assert_eq!(tables.experience, "sitedeneyim");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub projects: String,
    pub blogs: String,
    pub skills: String,
    pub experience: String,
    pub contact: String,
    pub infos: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self::with_prefix("")
    }
}

impl TableNames {
    /// Every table name prefixed, e.g. `with_prefix("site_")` → `site_projects`.
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            projects: format!("{prefix}projects"),
            blogs: format!("{prefix}blogs"),
            skills: format!("{prefix}skills"),
            experience: format!("{prefix}experience"),
            contact: format!("{prefix}contact"),
            infos: format!("{prefix}infos"),
        }
    }
}

fn decode<T: Record>(table: &str, rows: Vec<Value>) -> Result<Vec<T>, FolioError> {
    rows.into_iter()
        .map(|row| {
            let record: T = serde_json::from_value(row).map_err(|e| FolioError::InvalidRecord {
                table: table.to_string(),
                detail: e.to_string(),
            })?;
            record.validate().map_err(|detail| FolioError::InvalidRecord {
                table: table.to_string(),
                detail,
            })?;
            Ok(record)
        })
        .collect()
}

fn encode<T: Serialize>(table: &str, value: &T) -> Result<Value, FolioError> {
    serde_json::to_value(value).map_err(|e| FolioError::Internal(format!("Could not encode row for '{}': {}", table, e)))
}

fn checked(table: &str, result: Result<(), String>) -> Result<(), FolioError> {
    result.map_err(|detail| FolioError::InvalidRecord {
        table: table.to_string(),
        detail,
    })
}

/// Typed CRUD over the content tables.
pub struct ContentRepository {
    store: Arc<dyn RowStore>,
    tables: TableNames,
}

impl ContentRepository {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        Self {
            store,
            tables: TableNames::default(),
        }
    }

    pub fn with_tables(mut self, tables: TableNames) -> Self {
        self.tables = tables;
        self
    }

    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    async fn select<T: Record>(&self, table: &str, query: Query) -> Result<Vec<T>, FolioError> {
        let rows = self
            .store
            .select(table, &query)
            .await
            .map_err(|e| FolioError::store(table, e))?;
        debug!("Fetched {} rows from '{}'", rows.len(), table);
        decode(table, rows)
    }

    async fn insert_one<T: Record>(&self, table: &str, row: Value) -> Result<T, FolioError> {
        let stored = self
            .store
            .insert(table, vec![row])
            .await
            .map_err(|e| FolioError::store(table, e))?;
        decode::<T>(table, stored)?
            .into_iter()
            .next()
            .ok_or_else(|| FolioError::InvalidRecord {
                table: table.to_string(),
                detail: "insert returned no row".into(),
            })
    }

    async fn update_by_id(&self, table: &str, id: &str, patch: Value) -> Result<(), FolioError> {
        self.store
            .update(table, patch, &[Filter::eq("id", id)])
            .await
            .map_err(|e| FolioError::store(table, e))?;
        info!("Updated '{}' row {}", table, id);
        Ok(())
    }

    async fn delete_by_id(&self, table: &str, id: &str) -> Result<(), FolioError> {
        self.store
            .delete(table, &[Filter::eq("id", id)])
            .await
            .map_err(|e| FolioError::store(table, e))?;
        info!("Deleted '{}' row {}", table, id);
        Ok(())
    }

    // projects

    /// All projects, newest first.
    pub async fn projects(&self) -> Result<Vec<Project>, FolioError> {
        self.select(&self.tables.projects, Query::new().order(Order::desc("created_at")))
            .await
    }

    pub async fn add_project(&self, project: &NewProject) -> Result<Project, FolioError> {
        let table = &self.tables.projects;
        checked(table, project.validate())?;
        self.insert_one(table, encode(table, project)?).await
    }

    pub async fn update_project(&self, id: &str, project: &NewProject) -> Result<(), FolioError> {
        let table = &self.tables.projects;
        checked(table, project.validate())?;
        self.update_by_id(table, id, encode(table, project)?).await
    }

    pub async fn delete_project(&self, id: &str) -> Result<(), FolioError> {
        self.delete_by_id(&self.tables.projects, id).await
    }

    // blog posts

    /// All blog posts, newest first.
    pub async fn blog_posts(&self) -> Result<Vec<BlogPost>, FolioError> {
        self.select(&self.tables.blogs, Query::new().order(Order::desc("created_at")))
            .await
    }

    pub async fn blog_post(&self, slug: &str) -> Result<BlogPost, FolioError> {
        let table = &self.tables.blogs;
        self.select::<BlogPost>(table, Query::new().eq("slug", slug).limit(1))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| FolioError::NotFound {
                table: table.clone(),
                key: format!("slug = '{}'", slug),
            })
    }

    pub async fn add_blog_post(&self, post: &NewBlogPost) -> Result<BlogPost, FolioError> {
        let table = &self.tables.blogs;
        checked(table, post.validate())?;
        self.insert_one(table, encode(table, post)?).await
    }

    pub async fn update_blog_post(&self, id: &str, post: &NewBlogPost) -> Result<(), FolioError> {
        let table = &self.tables.blogs;
        checked(table, post.validate())?;
        self.update_by_id(table, id, encode(table, post)?).await
    }

    pub async fn delete_blog_post(&self, id: &str) -> Result<(), FolioError> {
        self.delete_by_id(&self.tables.blogs, id).await
    }

    // skills

    /// All skills, newest first.
    pub async fn skills(&self) -> Result<Vec<Skill>, FolioError> {
        self.select(&self.tables.skills, Query::new().order(Order::desc("created_at")))
            .await
    }

    pub async fn add_skill(&self, skill: &NewSkill) -> Result<Skill, FolioError> {
        let table = &self.tables.skills;
        checked(table, skill.validate())?;
        self.insert_one(table, encode(table, skill)?).await
    }

    pub async fn delete_skill(&self, id: &str) -> Result<(), FolioError> {
        self.delete_by_id(&self.tables.skills, id).await
    }

    // experience

    /// All positions, most recent start date first.
    pub async fn experience(&self) -> Result<Vec<Experience>, FolioError> {
        self.select(&self.tables.experience, Query::new().order(Order::desc("start_date")))
            .await
    }

    pub async fn add_experience(&self, entry: &NewExperience) -> Result<Experience, FolioError> {
        let table = &self.tables.experience;
        checked(table, entry.validate())?;
        let mut row = encode(table, entry)?;
        if entry.end_date.trim().is_empty() {
            row["end_date"] = Value::Null;
        }
        self.insert_one(table, row).await
    }

    pub async fn delete_experience(&self, id: &str) -> Result<(), FolioError> {
        self.delete_by_id(&self.tables.experience, id).await
    }

    // contact messages

    /// Messages, newest first, narrowed by processing state and an optional
    /// case-insensitive search over name, email and message.
    pub async fn messages(
        &self,
        filter: MessageFilter,
        search: Option<&str>,
    ) -> Result<Vec<ContactMessage>, FolioError> {
        let mut query = Query::new().order(Order::desc("created_at"));
        match filter {
            MessageFilter::All => {}
            MessageFilter::Processed => query = query.eq("is_processed", true),
            MessageFilter::Unprocessed => query = query.eq("is_processed", false),
        }
        let messages: Vec<ContactMessage> = self.select(&self.tables.contact, query).await?;
        Ok(match search.map(str::trim).filter(|s| !s.is_empty()) {
            Some(needle) => messages.into_iter().filter(|m| m.matches(needle)).collect(),
            None => messages,
        })
    }

    /// Store a visitor's message, unprocessed.
    pub async fn submit_message(&self, message: &NewContactMessage) -> Result<ContactMessage, FolioError> {
        let table = &self.tables.contact;
        checked(table, message.validate())?;
        let row = json!({
            "name": message.name,
            "email": message.email,
            "message": message.message,
            "is_processed": false,
        });
        self.insert_one(table, row).await
    }

    pub async fn set_processed(&self, id: &str, processed: bool) -> Result<(), FolioError> {
        self.update_by_id(&self.tables.contact, id, json!({ "is_processed": processed }))
            .await
    }

    /// Flip a message's processed flag.
    pub async fn toggle_processed(&self, message: &ContactMessage) -> Result<(), FolioError> {
        self.set_processed(&message.id, !message.is_processed).await
    }

    // site info

    /// The single site-info row.
    pub async fn site_info(&self) -> Result<SiteInfo, FolioError> {
        let table = &self.tables.infos;
        let mut rows: Vec<SiteInfo> = self.select(table, Query::new().limit(2)).await?;
        match rows.len() {
            0 => Err(FolioError::NotFound {
                table: table.clone(),
                key: "the site-info row".into(),
            }),
            1 => Ok(rows.remove(0)),
            n => Err(FolioError::InvalidRecord {
                table: table.clone(),
                detail: format!("expected exactly one row, found {}", n),
            }),
        }
    }

    pub async fn update_site_info(&self, id: &str, field: SiteInfoField, value: &str) -> Result<(), FolioError> {
        let mut patch = serde_json::Map::new();
        patch.insert(field.column().to_string(), Value::String(value.to_string()));
        self.update_by_id(&self.tables.infos, id, Value::Object(patch)).await
    }

    /// Point the site's CV link at an uploaded document.
    pub async fn set_cv_url(&self, id: &str, url: &str) -> Result<(), FolioError> {
        self.update_site_info(id, SiteInfoField::CvUrl, url).await
    }
}
