use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use anyhow::{Context, Result};
use minijinja::{context, value::Value as JinjaValue, Environment};
use once_cell::sync::Lazy;
use pulldown_cmark::escape::{escape_href, escape_html};
use rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};
use walkdir::WalkDir;

use crate::{
    components::Components,
    config::{Config, PageConfig},
    error::CardError,
    ids::CardIds,
    markdown::MarkdownRender,
};

const PAGE_TEMPLATE: &str = "page.jinja";

static LITE_JINJA: Lazy<Environment<'static>> = Lazy::new(init_lite_jinja);

pub fn init_lite_jinja<'a>() -> Environment<'a> {
    let mut env = Environment::new();
    env.add_template(
        "blocks/bangumi-script.jinja",
        include_str!("../templates/blocks/bangumi-script.jinja"),
    )
    .expect("Invalid bangumi script template.");
    env.add_template(PAGE_TEMPLATE, include_str!("../templates/page.jinja"))
        .expect("Invalid page template.");
    env
}

/// Render a builtin template.
pub fn render_lite(name: &'static str, context: JinjaValue) -> Result<String, CardError> {
    LITE_JINJA
        .get_template(name)
        .and_then(|template| template.render(context))
        .map_err(|source| CardError::Template { name, source })
}

/// Wrap rendered markdown into a standalone HTML page.
pub fn render_page(page: &PageConfig, content: &str) -> Result<String> {
    let mut title = String::new();
    escape_html(&mut title, &page.title)?;
    let stylesheet = match &page.stylesheet {
        Some(href) => {
            let mut escaped = String::new();
            escape_href(&mut escaped, href)?;
            Some(escaped)
        }
        None => None,
    };

    Ok(render_lite(
        PAGE_TEMPLATE,
        context! {
            title,
            stylesheet,
            content,
            version => env!("BANGUMI_CARD_VERSION"),
        },
    )?)
}

/// Statistics of one build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildSummary {
    pub pages: usize,
    pub cards: u64,
}

/// Render every markdown file of a source directory into HTML pages.
#[derive(Debug)]
pub struct BangumiEngine {
    pub source: PathBuf,
    pub dest: PathBuf,
    config: Config,
    ids: CardIds,
}

impl BangumiEngine {
    pub fn new(source: impl AsRef<Path>, dest: impl AsRef<Path>, config: Config) -> Result<Self> {
        let dest = dest.as_ref().to_path_buf();
        if !dest.exists() {
            fs::create_dir_all(&dest)?;
        }
        let ids = CardIds::new(&config.card.id_prefix)?;
        Ok(BangumiEngine {
            source: source.as_ref().to_path_buf(),
            dest,
            config,
            ids,
        })
    }

    fn markdown_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.source).sort_by_file_name() {
            let entry = entry?;
            let path = entry.path();
            // Never walk into our own output.
            if path.starts_with(&self.dest) && self.dest != self.source {
                continue;
            }
            if path.is_file() && path.extension().map_or(false, |ext| ext == "md") {
                files.push(path.to_path_buf());
            }
        }
        Ok(files)
    }

    pub fn build(&self) -> Result<BuildSummary> {
        let instant = Instant::now();
        let files = self.markdown_files()?;

        // Card ids are scoped by the page's position in the sorted walk,
        // so rebuilding the same source gives the same output.
        let cards = files
            .par_iter()
            .enumerate()
            .map(|(page, file)| -> Result<u64> {
                let ids = Arc::new(self.ids.scoped(page));
                let components = Components::new(&self.config, Arc::clone(&ids));
                let render = MarkdownRender::new(&components);
                let markdown = fs::read_to_string(file)
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                let content = render
                    .render_html(&markdown)
                    .with_context(|| format!("Failed to render {}", file.display()))?;
                let html = render_page(&self.config.page, &content)?;

                let dest = self
                    .dest
                    .join(file.strip_prefix(&self.source)?)
                    .with_extension("html");
                if let Some(parent_dir) = dest.parent() {
                    if !parent_dir.exists() {
                        fs::create_dir_all(parent_dir)?;
                    }
                }
                fs::write(&dest, html)?;
                tracing::debug!("Rendered {} -> {}", file.display(), dest.display());
                Ok(ids.allocated())
            })
            .collect::<Result<Vec<_>>>()?;

        let summary = BuildSummary {
            pages: files.len(),
            cards: cards.into_iter().sum(),
        };
        tracing::info!(
            pages = summary.pages,
            cards = summary.cards,
            "Build cost: {}ms",
            instant.elapsed().as_millis()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_page() {
        let page = PageConfig {
            title: "Cards & <friends>".to_owned(),
            stylesheet: Some("/card.css".to_owned()),
        };
        let html = render_page(&page, "<p>hi</p>").unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>Cards &amp; &lt;friends&gt;</title>"));
        assert!(html.contains(r#"<link rel="stylesheet" href="/card.css">"#));
        assert!(html.contains("<main>\n<p>hi</p>\n</main>"));
    }

    #[test]
    fn test_render_page_without_stylesheet() {
        let html = render_page(&PageConfig::default(), "").unwrap();
        assert!(!html.contains("stylesheet"));
        assert!(html.contains("<title>Bangumi cards</title>"));
    }

    #[test]
    fn test_build_dir() {
        let root = std::env::temp_dir().join(format!("bangumi-card-build-{}", std::process::id()));
        let source = root.join("source");
        let dest = root.join("dest");
        fs::create_dir_all(source.join("posts")).unwrap();
        fs::write(source.join("index.md"), "::bangumi{user=\"sai\"}\n").unwrap();
        fs::write(
            source.join("posts/friends.md"),
            "::bangumi{user=\"a\"}\n\n::bangumi{user=\"b\"}\n",
        )
        .unwrap();
        fs::write(source.join("notes.txt"), "::bangumi{user=\"x\"}\n").unwrap();

        let engine = BangumiEngine::new(&source, &dest, Config::default()).unwrap();
        let summary = engine.build().unwrap();
        assert_eq!(summary, BuildSummary { pages: 2, cards: 3 });

        let index = fs::read_to_string(dest.join("index.html")).unwrap();
        let friends = fs::read_to_string(dest.join("posts/friends.html")).unwrap();
        assert!(index.contains("card-bangumi"));
        assert_eq!(friends.matches("class=\"card-bangumi").count(), 2);
        assert!(!dest.join("notes.html").exists());

        // Ids follow the sorted walk order, whatever thread renders a page.
        assert!(index.contains("id=\"BC0_0-card\""));
        assert!(friends.contains("id=\"BC1_0-card\""));
        assert!(friends.contains("id=\"BC1_1-card\""));

        // Rebuilding gives byte-identical pages.
        for _ in 0..3 {
            BangumiEngine::new(&source, &dest, Config::default())
                .unwrap()
                .build()
                .unwrap();
            assert_eq!(fs::read_to_string(dest.join("index.html")).unwrap(), index);
            assert_eq!(
                fs::read_to_string(dest.join("posts/friends.html")).unwrap(),
                friends
            );
        }

        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_invalid_prefix() {
        let config = Config::parse("[card]\nid_prefix = \"1x\"").unwrap();
        let dest = std::env::temp_dir().join("bangumi-card-invalid-prefix");
        let err = BangumiEngine::new(".", &dest, config).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CardError>(),
            Some(CardError::InvalidIdPrefix(_))
        ));
    }
}
