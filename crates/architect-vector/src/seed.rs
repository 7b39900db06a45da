//! Loading component documentation and templates into a retriever.
//!
//! Docs are Markdown files named after their component. Template files are
//! JSON objects mapping component names to templates, one file per category.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use walkdir::WalkDir;

use crate::{Document, Retriever};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub seeded: usize,
    pub skipped_files: Vec<PathBuf>,
}

fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Files directly inside `dir` with the given extension, sorted by name
fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        anyhow::bail!("{} is not a directory", dir.display());
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case(extension))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Seed every `*.md` file in `dir` as one documentation chunk
pub async fn seed_docs(retriever: &dyn Retriever, dir: &Path) -> Result<SeedReport> {
    info!("Seeding component documentation from {}", dir.display());
    let mut report = SeedReport::default();

    for path in files_with_extension(dir, "md")? {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let component = file_stem(&path);
        let id = format!("doc-{}-{}", component, short_id());

        retriever
            .add(Document::documentation(id.clone(), component.clone(), content))
            .await?;
        info!("Seeded documentation '{}' for component '{}'", id, component);
        report.seeded += 1;
    }

    Ok(report)
}

/// Seed every `*.json` category file in `dir`, one document per component.
/// Files that are not a JSON object are logged and skipped.
pub async fn seed_templates(retriever: &dyn Retriever, dir: &Path) -> Result<SeedReport> {
    info!("Seeding component templates from {}", dir.display());
    let mut report = SeedReport::default();

    for path in files_with_extension(dir, "json")? {
        let category = file_stem(&path);
        let parsed = std::fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|raw| serde_json::from_str::<Value>(&raw).map_err(anyhow::Error::from));

        let templates = match parsed {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                error!("{} does not contain a JSON object of templates", path.display());
                report.skipped_files.push(path);
                continue;
            }
            Err(e) => {
                error!("Error parsing JSON in {}: {}", path.display(), e);
                report.skipped_files.push(path);
                continue;
            }
        };

        for (component, template) in templates {
            let id = format!("template-{}-{}-{}", category, component, short_id());
            retriever
                .add(Document::template(id.clone(), category.clone(), component.clone(), &template))
                .await?;
            info!(
                "Seeded template '{}' for component '{}' in category '{}'",
                id, component, category
            );
            report.seeded += 1;
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use std::fs;

    #[tokio::test]
    async fn test_seed_docs_and_templates() {
        let docs = tempfile::tempdir().unwrap();
        fs::write(docs.path().join("GitLoader.md"), "# Git Loader\nLoads a repo").unwrap();
        fs::write(docs.path().join("notes.txt"), "ignored").unwrap();

        let templates = tempfile::tempdir().unwrap();
        fs::write(
            templates.path().join("loaders.json"),
            r#"{"GitLoader": {"display_name": "Git Loader"}, "FileLoader": {}}"#,
        )
        .unwrap();
        fs::write(templates.path().join("broken.json"), "{not json").unwrap();

        let store = MemoryStore::new();
        let doc_report = seed_docs(&store, docs.path()).await.unwrap();
        let template_report = seed_templates(&store, templates.path()).await.unwrap();

        assert_eq!(doc_report.seeded, 1);
        assert_eq!(template_report.seeded, 2);
        assert_eq!(template_report.skipped_files.len(), 1);

        let hits = store.query_templates(Some("GitLoader"), 5).await;
        assert_eq!(hits.len(), 1);
        assert!(hits[0].id.starts_with("template-loaders-GitLoader-"));
        assert_eq!(hits[0].metadata["category"], "loaders");
        assert_eq!(hits[0].template_value().unwrap()["display_name"], "Git Loader");

        let docs = store.query_docs("git", 5, Some("documentation")).await;
        assert!(docs[0].id.starts_with("doc-GitLoader-"));
        assert_eq!(docs[0].id.len(), "doc-GitLoader-".len() + 8);
    }

    #[tokio::test]
    async fn test_seed_missing_dir_fails() {
        let store = MemoryStore::new();
        assert!(seed_docs(&store, Path::new("/definitely/not/here")).await.is_err());
    }
}
