use crate::models::Blog;
use anyhow::{bail, Context, Result};
use folio_store::identity::is_uuid;
use folio_store::{Document, ExternalFile, Session, Store};
use std::path::Path;

const HANDLE: &str = "identity.handles.current";
const SLUG: &str = "slugs.current";

fn success() {
    println!("Success!");
}

// ── Lookups ──────────────────────────────────────────────────────────

/// Author by uuid or current handle.
fn find_author(session: &Session, blog: &Blog, uid: &str) -> Result<Document> {
    if is_uuid(uid) {
        return session
            .query(&blog.author)
            .get(uid)
            .with_context(|| format!("author {uid}"));
    }
    let handle = blog.author.field::<String>(HANDLE)?;
    session
        .query(&blog.author)
        .filter(handle.eq(uid.to_string()))?
        .one()
        .with_context(|| format!("author {uid}"))
}

/// Category by uuid or name.
fn find_category(session: &Session, blog: &Blog, uid: &str) -> Result<Document> {
    if is_uuid(uid) {
        return session
            .query(&blog.category)
            .get(uid)
            .with_context(|| format!("category {uid}"));
    }
    let name = blog.category.field::<String>("name")?;
    session
        .query(&blog.category)
        .filter(name.eq(uid.to_string()))?
        .one()
        .with_context(|| format!("category {uid}"))
}

/// Article by uuid or current slug.
fn find_article(session: &Session, blog: &Blog, uid: &str) -> Result<Document> {
    if is_uuid(uid) {
        return session
            .query(&blog.article)
            .get(uid)
            .with_context(|| format!("article {uid}"));
    }
    let slug = blog.article.field::<String>(SLUG)?;
    session
        .query(&blog.article)
        .filter(slug.eq(uid.to_string()))?
        .one()
        .with_context(|| format!("article {uid}"))
}

fn find_email(session: &Session, blog: &Blog, author: &Document, address: &str) -> Result<Document> {
    let email = blog.email.field::<String>("email")?;
    session
        .query(&blog.email)
        .parent(author)?
        .filter(email.eq(address.to_string()))?
        .one()
        .with_context(|| format!("email {address} of {}", author.label()))
}

fn handle_of(author: &Document) -> Result<String> {
    Ok(author.get::<String>(HANDLE)?)
}

// ── Authors ──────────────────────────────────────────────────────────

pub fn author_list(store: &Store, blog: &Blog) -> Result<()> {
    store.read_only(|s| -> Result<()> {
        let handle = blog.author.field::<String>(HANDLE)?;
        for author in s.query(&blog.author).order_by(&handle)?.all()? {
            let name: String = author.get("identity.name")?;
            println!("{} {} {}", author.uuid()?, handle.get(&author)?, name);
        }
        Ok(())
    })
}

pub fn author_create(store: &Store, blog: &Blog, handle: &str) -> Result<()> {
    store.read_write(|s| -> Result<()> {
        let field = blog.author.field::<String>(HANDLE)?;
        if s.query(&blog.author).filter(field.eq(handle.to_string()))?.count()? > 0 {
            bail!("author {handle} already exists");
        }
        let author = Document::new(&blog.author)?;
        field.set(&author, handle.to_string())?;
        s.add([&author])?;
        println!("{}", author.uuid()?);
        Ok(())
    })?;
    success();
    Ok(())
}

pub fn author_delete(store: &Store, blog: &Blog, uid: &str) -> Result<()> {
    store.read_write(|s| -> Result<()> {
        let author = find_author(s, blog, uid)?;
        let written = articles_by(s, blog, &author)?;
        if !written.is_empty() {
            bail!(
                "author {} is credited on {} article(s)",
                handle_of(&author)?,
                written.len()
            );
        }
        s.delete([&author])?;
        Ok(())
    })?;
    success();
    Ok(())
}

pub fn author_info(store: &Store, blog: &Blog, uid: &str) -> Result<()> {
    store.read_only(|s| -> Result<()> {
        let author = find_author(s, blog, uid)?;
        println!("{}", author.pformat(Some(s))?);
        for email in s.query(&blog.email).parent(&author)?.all()? {
            let address: String = email.get("email")?;
            let label: String = email.get("label")?;
            let primary = if email.get::<bool>("is_primary")? { " (primary)" } else { "" };
            println!("  {address} [{label}]{primary}");
        }
        Ok(())
    })
}

pub fn author_set_name(store: &Store, blog: &Blog, uid: &str, name: &str) -> Result<()> {
    store.read_write(|s| -> Result<()> {
        let author = find_author(s, blog, uid)?;
        author.set("identity.name", name.to_string())?;
        s.add([&author])?;
        Ok(())
    })?;
    success();
    Ok(())
}

pub fn email_add(store: &Store, blog: &Blog, uid: &str, address: &str) -> Result<()> {
    store.read_write(|s| -> Result<()> {
        let author = find_author(s, blog, uid)?;
        let existing = s.query(&blog.email).parent(&author)?.all()?;
        for email in &existing {
            if email.get::<String>("email")? == address {
                bail!("{address} is already registered for {}", handle_of(&author)?);
            }
        }
        let email = Document::new_inline(&blog.email, &author)?;
        email.set("email", address.to_string())?;
        email.set("is_primary", existing.is_empty())?;
        s.add([&email])?;
        Ok(())
    })?;
    success();
    Ok(())
}

pub fn email_delete(store: &Store, blog: &Blog, uid: &str, address: &str) -> Result<()> {
    store.read_write(|s| -> Result<()> {
        let author = find_author(s, blog, uid)?;
        let email = find_email(s, blog, &author, address)?;
        s.delete([&email])?;
        Ok(())
    })?;
    success();
    Ok(())
}

pub fn email_primary(store: &Store, blog: &Blog, uid: &str, address: &str) -> Result<()> {
    store.read_write(|s| -> Result<()> {
        let author = find_author(s, blog, uid)?;
        let primary = find_email(s, blog, &author, address)?;
        let emails = s.query(&blog.email).parent(&author)?.all()?;
        for email in &emails {
            email.set("is_primary", email.ptr_eq(&primary))?;
        }
        s.add(&emails)?;
        Ok(())
    })?;
    success();
    Ok(())
}

pub fn email_label(store: &Store, blog: &Blog, uid: &str, address: &str, label: &str) -> Result<()> {
    store.read_write(|s| -> Result<()> {
        let author = find_author(s, blog, uid)?;
        let email = find_email(s, blog, &author, address)?;
        email.set("label", label.to_string())?;
        s.add([&email])?;
        Ok(())
    })?;
    success();
    Ok(())
}

// ── Categories ───────────────────────────────────────────────────────

pub fn category_list(store: &Store, blog: &Blog) -> Result<()> {
    store.read_only(|s| -> Result<()> {
        let name = blog.category.field::<String>("name")?;
        let parent = blog.category.field::<Document>("parent-category")?;
        for category in s.query(&blog.category).order_by(&name)?.all()? {
            let within = match parent.get_opt(&category)? {
                Some(parent) => format!(" (in {})", name.get(&parent)?),
                None => String::new(),
            };
            println!("{} {}{}", category.uuid()?, name.get(&category)?, within);
        }
        Ok(())
    })
}

pub fn category_create(store: &Store, blog: &Blog, name: &str, parent: Option<&str>) -> Result<()> {
    store.read_write(|s| -> Result<()> {
        let field = blog.category.field::<String>("name")?;
        if s.query(&blog.category).filter(field.eq(name.to_string()))?.count()? > 0 {
            bail!("category {name} already exists");
        }
        let category = Document::new(&blog.category)?;
        field.set(&category, name.to_string())?;
        if let Some(uid) = parent {
            category.set("parent-category", find_category(s, blog, uid)?)?;
        }
        s.add([&category])?;
        println!("{}", category.uuid()?);
        Ok(())
    })?;
    success();
    Ok(())
}

pub fn category_delete(store: &Store, blog: &Blog, uid: &str) -> Result<()> {
    store.read_write(|s| -> Result<()> {
        let category = find_category(s, blog, uid)?;
        let children = s
            .query(&blog.category)
            .filter(blog.category.field::<Document>("parent-category")?.eq(category.clone()))?
            .count()?;
        let articles = s
            .query(&blog.article)
            .filter(blog.article.field::<Document>("category")?.eq(category.clone()))?
            .count()?;
        if children + articles > 0 {
            bail!(
                "category is still used by {children} categorie(s) and {articles} article(s)"
            );
        }
        s.delete([&category])?;
        Ok(())
    })?;
    success();
    Ok(())
}

// ── Articles ─────────────────────────────────────────────────────────

/// Slug of the first Markdown heading.
pub fn slug_from_markdown(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim_start)
        .find(|line| line.starts_with('#'))
        .map(|line| slug::slugify(line.trim_start_matches('#')))
        .filter(|slug| !slug.is_empty())
}

fn articles_by(session: &Session, blog: &Blog, author: &Document) -> Result<Vec<Document>> {
    let mut found = Vec::new();
    for article in session.query(&blog.article).all()? {
        let authors: Vec<Document> = article.get("authors")?;
        if authors.iter().any(|a| a.ptr_eq(author)) {
            found.push(article);
        }
    }
    Ok(found)
}

pub fn article_list(store: &Store, blog: &Blog) -> Result<()> {
    store.read_only(|s| -> Result<()> {
        let slug = blog.article.field::<String>(SLUG)?;
        for article in s.query(&blog.article).order_by(&slug)?.all()? {
            let authors = article
                .get::<Vec<Document>>("authors")?
                .iter()
                .map(handle_of)
                .collect::<Result<Vec<_>>>()?;
            println!(
                "{} {} by {}",
                article.uuid()?,
                slug.get(&article)?,
                authors.join(", ")
            );
        }
        Ok(())
    })
}

pub struct NewArticle<'a> {
    pub authors: &'a [String],
    pub contents: &'a Path,
    pub category: Option<&'a str>,
    pub tags: Vec<String>,
}

pub fn article_create(store: &Store, blog: &Blog, new: NewArticle<'_>) -> Result<()> {
    let text = std::fs::read_to_string(new.contents)
        .with_context(|| format!("Failed to read contents file '{}'", new.contents.display()))?;
    let slug = slug_from_markdown(&text)
        .with_context(|| format!("{} has no Markdown heading", new.contents.display()))?;
    let filename = new
        .contents
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "contents.md".to_string());

    store.read_write(|s| -> Result<()> {
        let field = blog.article.field::<String>(SLUG)?;
        if s.query(&blog.article).filter(field.eq(slug.clone()))?.count()? > 0 {
            bail!("an article with slug {slug} already exists");
        }

        let authors = new
            .authors
            .iter()
            .map(|uid| find_author(s, blog, uid))
            .collect::<Result<Vec<_>>>()?;

        let article = Document::new(&blog.article)?;
        field.set(&article, slug.clone())?;
        article.set("authors", authors)?;
        article.set("tags", new.tags.clone())?;
        if let Some(uid) = new.category {
            article.set("category", find_category(s, blog, uid)?)?;
        }
        let contents = ExternalFile::new(&filename);
        contents.copy_from(new.contents)?;
        article.set("contents", contents)?;

        s.add([&article])?;
        println!("{}", article.uuid()?);
        Ok(())
    })?;
    success();
    Ok(())
}

pub fn article_show(store: &Store, blog: &Blog, uid: &str) -> Result<()> {
    store.read_only(|s| -> Result<()> {
        let article = find_article(s, blog, uid)?;
        println!("{}", article.pformat(Some(s))?);
        let contents: ExternalFile = article.get("contents")?;
        println!("{}", contents.read_to_string(s)?);
        Ok(())
    })
}

pub fn article_delete(store: &Store, blog: &Blog, uid: &str) -> Result<()> {
    store.read_write(|s| -> Result<()> {
        let article = find_article(s, blog, uid)?;
        s.delete([&article])?;
        Ok(())
    })?;
    success();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> (Blog, Store) {
        let blog = Blog::declare().unwrap();
        let store = Store::open(dir.path(), blog.registry().unwrap()).unwrap();
        (blog, store)
    }

    fn count(store: &Store, class: &std::rc::Rc<folio_store::ModelClass>) -> usize {
        store.read_only(|s| s.query(class).count()).unwrap()
    }

    #[test]
    fn test_slug_from_first_heading() {
        assert_eq!(
            slug_from_markdown("intro\n\n## Hello, World!\n# Other").as_deref(),
            Some("hello-world")
        );
        assert_eq!(slug_from_markdown("no heading here"), None);
        assert_eq!(slug_from_markdown("#\n"), None);
    }

    #[test]
    fn test_author_lifecycle() {
        let dir = TempDir::new().unwrap();
        let (blog, store) = open(&dir);

        author_create(&store, &blog, "alice").unwrap();
        assert!(author_create(&store, &blog, "alice").is_err());
        author_set_name(&store, &blog, "alice", "Alice").unwrap();
        email_add(&store, &blog, "alice", "alice@example.com").unwrap();
        email_add(&store, &blog, "alice", "al@example.com").unwrap();
        email_primary(&store, &blog, "alice", "al@example.com").unwrap();
        email_label(&store, &blog, "alice", "al@example.com", "business").unwrap();

        store
            .read_only(|s| -> Result<()> {
                let author = find_author(s, &blog, "alice")?;
                assert_eq!(author.get::<String>("identity.name")?, "Alice");
                let primary = find_email(s, &blog, &author, "al@example.com")?;
                assert!(primary.get::<bool>("is_primary")?);
                assert_eq!(primary.get::<String>("label")?, "business");
                let other = find_email(s, &blog, &author, "alice@example.com")?;
                assert!(!other.get::<bool>("is_primary")?);
                Ok(())
            })
            .unwrap();

        email_delete(&store, &blog, "alice", "alice@example.com").unwrap();
        assert_eq!(count(&store, &blog.email), 1);
        author_delete(&store, &blog, "alice").unwrap();
        assert_eq!(count(&store, &blog.author), 0);
        assert_eq!(count(&store, &blog.email), 0);
    }

    #[test]
    fn test_invalid_email_is_not_written() {
        let dir = TempDir::new().unwrap();
        let (blog, store) = open(&dir);
        author_create(&store, &blog, "alice").unwrap();
        assert!(email_add(&store, &blog, "alice", "not-an-email").is_err());
        assert_eq!(count(&store, &blog.email), 0);
    }

    #[test]
    fn test_article_lifecycle() {
        let dir = TempDir::new().unwrap();
        let (blog, store) = open(&dir);
        author_create(&store, &blog, "alice").unwrap();
        category_create(&store, &blog, "tech", None).unwrap();
        category_create(&store, &blog, "rust", Some("tech")).unwrap();

        let source = dir.path().join("draft.md");
        std::fs::write(&source, "# Ownership in Rust\n\nBorrow it.").unwrap();
        let authors = vec!["alice".to_string()];
        article_create(
            &store,
            &blog,
            NewArticle {
                authors: &authors,
                contents: &source,
                category: Some("rust"),
                tags: vec!["intro".to_string()],
            },
        )
        .unwrap();

        store
            .read_only(|s| -> Result<()> {
                let article = find_article(s, &blog, "ownership-in-rust")?;
                let contents: ExternalFile = article.get("contents")?;
                assert_eq!(contents.read_to_string(s)?, "# Ownership in Rust\n\nBorrow it.");
                let authors: Vec<Document> = article.get("authors")?;
                assert_eq!(handle_of(&authors[0])?, "alice");
                let category: Document = article.get("category")?;
                assert_eq!(category.get::<String>("name")?, "rust");
                Ok(())
            })
            .unwrap();

        // Referenced documents cannot go away.
        assert!(author_delete(&store, &blog, "alice").is_err());
        assert!(category_delete(&store, &blog, "rust").is_err());
        assert!(category_delete(&store, &blog, "tech").is_err());

        article_delete(&store, &blog, "ownership-in-rust").unwrap();
        assert_eq!(count(&store, &blog.article), 0);
        assert!(!dir.path().join("articles").exists());
        category_delete(&store, &blog, "rust").unwrap();
        category_delete(&store, &blog, "tech").unwrap();
        author_delete(&store, &blog, "alice").unwrap();
    }
}
