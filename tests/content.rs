//! Repository behaviour over the in-memory row store.

use folio_kit::content::{NewBlogPost, NewContactMessage, NewExperience, NewProject, NewSkill};
use folio_kit::{
    ContentRepository, FolioError, MemoryRowStore, MessageFilter, SiteInfoField, StoreError,
    TableNames,
};
use serde_json::json;
use std::sync::Arc;

fn repo() -> (Arc<MemoryRowStore>, ContentRepository) {
    let store = Arc::new(MemoryRowStore::new());
    (store.clone(), ContentRepository::new(store))
}

#[tokio::test]
async fn projects_come_back_newest_first_with_parsed_technologies() {
    let (_, repo) = repo();
    repo.add_project(&NewProject::new("First", "one").technologies_csv("rust, tokio,,"))
        .await
        .unwrap();
    repo.add_project(&NewProject::new("Second", "two"))
        .await
        .unwrap();

    let projects = repo.projects().await.unwrap();
    let titles: Vec<_> = projects.iter().map(|p| p.title.as_str()).collect();
    assert_eq!(titles, ["Second", "First"]);
    assert_eq!(projects[1].technologies, ["rust", "tokio"]);
}

#[tokio::test]
async fn blank_title_is_rejected_before_reaching_the_store() {
    let (store, repo) = repo();
    let err = repo
        .add_project(&NewProject::new("   ", "desc"))
        .await
        .unwrap_err();

    assert!(matches!(err, FolioError::InvalidRecord { .. }));
    assert!(store.rows("projects").is_empty());
}

#[tokio::test]
async fn blog_post_lookup_by_slug() {
    let (_, repo) = repo();
    let post = NewBlogPost {
        title: "Hello".into(),
        slug: "hello-world".into(),
        description: "**Bold** start".into(),
        ..NewBlogPost::default()
    };
    repo.add_blog_post(&post).await.unwrap();

    let found = repo.blog_post("hello-world").await.unwrap();
    assert_eq!(found.title, "Hello");
    assert_eq!(found.body_html(), "<strong>Bold</strong> start");

    let missing = repo.blog_post("nope").await.unwrap_err();
    assert!(matches!(missing, FolioError::NotFound { .. }));
}

#[tokio::test]
async fn slug_with_spaces_is_invalid() {
    let (_, repo) = repo();
    let post = NewBlogPost {
        title: "Hello".into(),
        slug: "hello world".into(),
        ..NewBlogPost::default()
    };
    assert!(matches!(
        repo.add_blog_post(&post).await,
        Err(FolioError::InvalidRecord { .. })
    ));
}

#[tokio::test]
async fn update_and_delete_touch_only_the_named_row() {
    let (store, repo) = repo();
    let a = repo.add_skill(&NewSkill { name: "Rust".into(), ..Default::default() }).await.unwrap();
    let b = repo.add_skill(&NewSkill { name: "Go".into(), ..Default::default() }).await.unwrap();

    repo.delete_skill(&a.id).await.unwrap();
    let names: Vec<_> = repo.skills().await.unwrap().into_iter().map(|s| s.name).collect();
    assert_eq!(names, ["Go"]);
    assert_eq!(store.rows("skills")[0]["id"], json!(b.id));

    let project = repo.add_project(&NewProject::new("Old", "d")).await.unwrap();
    repo.update_project(&project.id, &NewProject::new("New", "d"))
        .await
        .unwrap();
    assert_eq!(repo.projects().await.unwrap()[0].title, "New");
}

#[tokio::test]
async fn experience_sorted_by_start_date_and_current_positions() {
    let (_, repo) = repo();
    for (title, start, end) in [
        ("Junior", "2018-01-01", "2020-06-30"),
        ("Lead", "2022-03-01", ""),
        ("Senior", "2020-07-01", "2022-02-28"),
    ] {
        let entry = NewExperience {
            title: title.into(),
            company: "Acme".into(),
            start_date: start.into(),
            end_date: end.into(),
            ..Default::default()
        };
        repo.add_experience(&entry).await.unwrap();
    }

    let all = repo.experience().await.unwrap();
    let titles: Vec<_> = all.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, ["Lead", "Senior", "Junior"]);
    assert!(all[0].is_current());
    assert_eq!(all[0].end_date, None);
    assert!(!all[1].is_current());
}

#[tokio::test]
async fn malformed_start_date_is_invalid() {
    let (_, repo) = repo();
    let entry = NewExperience {
        title: "Dev".into(),
        company: "Acme".into(),
        start_date: "March 2020".into(),
        ..Default::default()
    };
    assert!(matches!(
        repo.add_experience(&entry).await,
        Err(FolioError::InvalidRecord { .. })
    ));
}

#[tokio::test]
async fn messages_filter_search_and_toggle() {
    let (_, repo) = repo();
    repo.submit_message(&NewContactMessage::new("Ada", "ada@example.com", "Hiring?"))
        .await
        .unwrap();
    let second = repo
        .submit_message(&NewContactMessage::new("Linus", "linus@example.com", "Kernel question"))
        .await
        .unwrap();
    assert!(!second.is_processed);

    repo.toggle_processed(&second).await.unwrap();

    let processed = repo.messages(MessageFilter::Processed, None).await.unwrap();
    assert_eq!(processed.len(), 1);
    assert_eq!(processed[0].name, "Linus");

    let open = repo.messages(MessageFilter::Unprocessed, None).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].name, "Ada");

    let hits = repo.messages(MessageFilter::All, Some("KERNEL")).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].email, "linus@example.com");

    let everyone = repo.messages(MessageFilter::All, Some("  ")).await.unwrap();
    assert_eq!(everyone.len(), 2);
}

#[tokio::test]
async fn site_info_requires_exactly_one_row() {
    let (store, repo) = repo();
    assert!(matches!(repo.site_info().await, Err(FolioError::NotFound { .. })));

    store.seed("infos", [json!({"id": 1, "email": "me@example.com"})]);
    let info = repo.site_info().await.unwrap();
    assert_eq!(info.id, "1");
    assert_eq!(info.email.as_deref(), Some("me@example.com"));

    store.seed("infos", [json!({"id": 2})]);
    assert!(matches!(repo.site_info().await, Err(FolioError::InvalidRecord { .. })));
}

#[tokio::test]
async fn set_cv_url_patches_only_that_column() {
    let (store, repo) = repo();
    store.seed("infos", [json!({"id": "7", "email": "me@example.com", "cv_url": null})]);

    repo.set_cv_url("7", "https://cdn.example/cv_1.pdf").await.unwrap();
    repo.update_site_info("7", SiteInfoField::Phone, "+1 555").await.unwrap();

    let info = repo.site_info().await.unwrap();
    assert_eq!(info.cv_url.as_deref(), Some("https://cdn.example/cv_1.pdf"));
    assert_eq!(info.phone.as_deref(), Some("+1 555"));
    assert_eq!(info.email.as_deref(), Some("me@example.com"));
}

#[tokio::test]
async fn malformed_rows_surface_as_invalid_records() {
    let (store, repo) = repo();
    store.seed("projects", [json!({"id": "1", "title": ""})]);
    let err = repo.projects().await.unwrap_err();
    assert!(matches!(err, FolioError::InvalidRecord { ref table, .. } if table == "projects"));

    store.seed("blogs", [json!({"id": "1", "title": 42, "slug": "x"})]);
    assert!(matches!(
        repo.blog_posts().await,
        Err(FolioError::InvalidRecord { .. })
    ));
}

#[tokio::test]
async fn prefixed_tables_are_used_for_every_operation() {
    let (store, repo) = repo();
    let repo = repo.with_tables(TableNames::with_prefix("site"));
    repo.add_skill(&NewSkill { name: "Rust".into(), ..Default::default() })
        .await
        .unwrap();

    assert_eq!(store.rows("siteskills").len(), 1);
    assert!(store.rows("skills").is_empty());
}

#[tokio::test]
async fn store_failures_name_the_table() {
    struct Down;

    #[async_trait::async_trait]
    impl folio_kit::RowStore for Down {
        async fn select(
            &self,
            _: &str,
            _: &folio_kit::Query,
        ) -> Result<Vec<serde_json::Value>, StoreError> {
            Err(StoreError::Status { status: 503 })
        }
        async fn insert(
            &self,
            _: &str,
            _: Vec<serde_json::Value>,
        ) -> Result<Vec<serde_json::Value>, StoreError> {
            Err(StoreError::Status { status: 503 })
        }
        async fn update(
            &self,
            _: &str,
            _: serde_json::Value,
            _: &[folio_kit::Filter],
        ) -> Result<(), StoreError> {
            Err(StoreError::Status { status: 503 })
        }
        async fn delete(&self, _: &str, _: &[folio_kit::Filter]) -> Result<(), StoreError> {
            Err(StoreError::Status { status: 503 })
        }
    }

    let repo = ContentRepository::new(Arc::new(Down));
    let err = repo.skills().await.unwrap_err();
    assert!(matches!(err, FolioError::Store { ref table, .. } if table == "skills"));
}

#[tokio::test]
async fn null_columns_decode_to_empty_values() {
    let (store, repo) = repo();
    store.seed(
        "projects",
        [
            json!({"id": "1", "title": "Bare", "description": null, "technologies": null}),
            json!({"id": "2", "title": "Full", "description": "d", "technologies": ["rust"]}),
        ],
    );
    store.seed(
        "blogs",
        [json!({"id": "1", "title": "Draft", "slug": "draft", "description": null})],
    );
    store.seed(
        "contact",
        [json!({"id": "1", "name": "A", "email": "a@example.com", "message": "hi", "is_processed": null})],
    );

    let projects = repo.projects().await.unwrap();
    assert_eq!(projects.len(), 2);
    let bare = projects.iter().find(|p| p.id == "1").unwrap();
    assert_eq!(bare.description, "");
    assert!(bare.technologies.is_empty());

    let posts = repo.blog_posts().await.unwrap();
    assert_eq!(posts[0].description, "");
    assert_eq!(posts[0].body_html(), "");

    let messages = repo.messages(MessageFilter::All, None).await.unwrap();
    assert!(!messages[0].is_processed);
}

#[tokio::test]
async fn single_table_name_can_be_overridden() {
    let (store, repo) = repo();
    let repo = repo.with_tables(TableNames {
        experience: "sitedeneyim".into(),
        ..TableNames::with_prefix("site")
    });
    let entry = NewExperience {
        title: "Dev".into(),
        company: "Acme".into(),
        start_date: "2021-01-01".into(),
        ..Default::default()
    };
    repo.add_experience(&entry).await.unwrap();
    repo.add_skill(&NewSkill { name: "Rust".into(), ..Default::default() })
        .await
        .unwrap();

    assert_eq!(store.rows("sitedeneyim").len(), 1);
    assert!(store.rows("siteexperience").is_empty());
    assert_eq!(store.rows("siteskills").len(), 1);
    assert_eq!(repo.experience().await.unwrap()[0].title, "Dev");
}
