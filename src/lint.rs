use std::{
    collections::BTreeMap,
    fs,
    io::Read,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use html5ever::{parse_document, tendril::TendrilSink, tree_builder::TreeBuilderOpts, ParseOpts};
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use walkdir::WalkDir;

/// An element id used more than once in one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateId {
    pub id: String,
    pub count: usize,
}

/// Collect the ids which appear more than once in `html`.
pub fn find_duplicate_ids<R: Read>(mut html: R) -> Result<Vec<DuplicateId>> {
    let parse_opts = ParseOpts {
        tree_builder: TreeBuilderOpts {
            scripting_enabled: false,
            drop_doctype: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let rc_dom = parse_document(RcDom::default(), parse_opts)
        .from_utf8()
        .read_from(&mut html)?;

    let mut ids = BTreeMap::new();
    walk(&rc_dom.document, &mut ids);
    Ok(ids
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(id, count)| DuplicateId { id, count })
        .collect())
}

// Walk html tree to count every `id` attribute.
fn walk(handle: &Handle, ids: &mut BTreeMap<String, usize>) {
    if let NodeData::Element { ref attrs, .. } = handle.data {
        if let Some(id) = attrs
            .borrow()
            .iter()
            .find(|attr| attr.name.local.as_ref() == "id")
        {
            *ids.entry(id.value.to_string()).or_default() += 1;
        }
    }
    for child in handle.children.borrow().iter() {
        walk(child, ids);
    }
}

/// Lint every rendered `*.html` file under `dir`.
/// Return true if lint success.
pub fn lint_dir<P: AsRef<Path>>(dir: P) -> Result<bool> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let path = entry?.into_path();
        if path.is_file() && path.extension().map_or(false, |ext| ext == "html") {
            files.push(path);
        }
    }

    let reports = files
        .par_iter()
        .map(|file| -> Result<(&PathBuf, Vec<DuplicateId>)> {
            let html = fs::File::open(file)
                .with_context(|| format!("Failed to open {}", file.display()))?;
            Ok((file, find_duplicate_ids(html)?))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut success = true;
    for (file, duplicates) in reports {
        if duplicates.is_empty() {
            continue;
        }
        success = false;
        println!("\nThe following ids of {} are duplicated:", file.display());
        duplicates
            .iter()
            .for_each(|dup| println!("- {} ({} times)", dup.id, dup.count));
    }
    tracing::info!(files = files.len(), "Lint finished");
    Ok(success)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_duplicates() {
        let html = r#"<div id="a"><span id="b"></span></div><p id="c">x</p>"#;
        assert!(find_duplicate_ids(html.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn test_duplicates() {
        let html = r#"<html><body>
            <a id="BC0-card"><div id="BC0-avatar"></div></a>
            <a id="BC0-card"><div id="BC0-avatar"></div></a>
            <p id="BC0-avatar"></p>
            <p id="BC1-card"></p>
        </body></html>"#;
        assert_eq!(
            find_duplicate_ids(html.as_bytes()).unwrap(),
            vec![
                DuplicateId {
                    id: "BC0-avatar".into(),
                    count: 3
                },
                DuplicateId {
                    id: "BC0-card".into(),
                    count: 2
                },
            ]
        );
    }

    #[test]
    fn test_lint_dir() {
        let root = std::env::temp_dir().join(format!("bangumi-card-lint-{}", std::process::id()));
        fs::create_dir_all(root.join("nested")).unwrap();
        fs::write(root.join("ok.html"), r#"<p id="a"></p><p id="b"></p>"#).unwrap();
        fs::write(root.join("dup.txt"), r#"<p id="a"></p><p id="a"></p>"#).unwrap();
        assert!(lint_dir(&root).unwrap());

        fs::write(
            root.join("nested/dup.html"),
            r#"<p id="a"></p><p id="a"></p>"#,
        )
        .unwrap();
        assert!(!lint_dir(&root).unwrap());

        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_lint_missing_dir() {
        let missing = std::env::temp_dir().join("bangumi-card-lint-missing-dir");
        assert!(lint_dir(missing).is_err());
    }
}
