//! Display names for upload folders.
//!
//! SAP exports wrap the interesting folder in build scaffolding
//! (`src/main/resources/...`, `META-INF`) and name archives with timestamps,
//! so the name shown for a Folder is picked heuristically.

use std::collections::BTreeSet;

/// Used when nothing in the archive yields a usable name.
pub const DEFAULT_FOLDER_NAME: &str = "iFlow Integration";

/// Top-level directories that never name an integration.
const TECHNICAL_DIRS: &[&str] = &[
    "src",
    "target",
    "build",
    "bin",
    "lib",
    "resources",
    "meta-inf",
    "web-inf",
];

/// Words that mark a directory as a likely integration name.
const DESCRIPTIVE_WORDS: &[&str] = &[
    "flow",
    "integration",
    "process",
    "service",
    "api",
    "data",
    "customer",
    "order",
    "material",
    "product",
];

const PREFIXES: &[&str] = &[
    "iflow",
    "integration flow",
    "integrationflow",
    "sap",
    "flow",
    "integration",
];

const SUFFIXES: &[&str] = &["iflow", "flow", "integration"];

const MIN_NAME_LEN: usize = 3;

/// Pick a display name from archive entry paths and the archive file name.
///
/// Tries, in order: the most descriptive non-technical top-level directory,
/// the stem of the first `.iflw` entry, the archive stem without a numeric
/// timestamp prefix, then [`DEFAULT_FOLDER_NAME`].
pub fn derive_folder_name<'a>(
    entries: impl IntoIterator<Item = &'a str>,
    archive_name: &str,
) -> String {
    let entries: Vec<&str> = entries.into_iter().collect();

    let roots: BTreeSet<&str> = entries
        .iter()
        .filter_map(|path| path.trim_start_matches('/').split_once('/'))
        .map(|(root, _)| root)
        .filter(|root| !is_technical(root))
        .collect();
    if let Some(name) = best_root(&roots).and_then(clean_folder_name) {
        return name;
    }

    let first_iflow = entries
        .iter()
        .find(|path| path.to_lowercase().ends_with(".iflw"))
        .map(|path| file_stem(path));
    if let Some(name) = first_iflow.and_then(clean_folder_name) {
        return name;
    }

    let mut stem = file_stem(archive_name);
    while let Some((head, rest)) = stem.split_once('_') {
        if head.is_empty() || !head.chars().all(|c| c.is_ascii_digit()) {
            break;
        }
        stem = rest;
    }
    clean_folder_name(stem).unwrap_or_else(|| DEFAULT_FOLDER_NAME.to_string())
}

/// Normalize separators and strip iFlow boilerplate. `None` if too short to be useful.
pub fn clean_folder_name(raw: &str) -> Option<String> {
    let mut name = collapse(&raw.replace('_', " "));

    if let Some(prefix) = PREFIXES.iter().find(|p| starts_with_ignore_case(&name, p)) {
        name = name[prefix.len()..].trim().to_string();
    }
    if let Some(suffix) = SUFFIXES.iter().find(|s| ends_with_ignore_case(&name, s)) {
        name = name[..name.len() - suffix.len()].trim().to_string();
    }

    let name = collapse(&name);
    (name.chars().count() >= MIN_NAME_LEN).then_some(name)
}

fn best_root<'a>(roots: &BTreeSet<&'a str>) -> Option<&'a str> {
    let candidates: Vec<&str> = roots
        .iter()
        .copied()
        .filter(|root| root.chars().count() >= MIN_NAME_LEN)
        .collect();
    candidates
        .iter()
        .find(|root| {
            let lower = root.to_lowercase();
            DESCRIPTIVE_WORDS.iter().any(|word| lower.contains(word))
        })
        .or_else(|| candidates.first())
        .copied()
        .or_else(|| roots.iter().next().copied())
}

fn is_technical(dir: &str) -> bool {
    TECHNICAL_DIRS.iter().any(|t| t.eq_ignore_ascii_case(dir))
}

fn file_stem(path: &str) -> &str {
    let file = path.rsplit(['/', '\\']).next().unwrap_or(path);
    match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file,
    }
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

fn ends_with_ignore_case(s: &str, suffix: &str) -> bool {
    s.len() >= suffix.len()
        && s.get(s.len() - suffix.len()..)
            .is_some_and(|tail| tail.eq_ignore_ascii_case(suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_descriptive_root_folder() {
        let entries = [
            "META-INF/MANIFEST.MF",
            "Billing/src/main/resources/scenarioflows/integrationflow/a.iflw",
            "Customer_Order_Sync/src/main/resources/b.iflw",
        ];
        assert_eq!(derive_folder_name(entries, "upload.zip"), "Customer Order Sync");
    }

    #[test]
    fn test_falls_back_to_iflow_stem() {
        let entries = ["src/main/resources/scenarioflows/integrationflow/Material_Master_iFlow.iflw"];
        assert_eq!(derive_folder_name(entries, "x.zip"), "Material Master");
    }

    #[test]
    fn test_falls_back_to_archive_stem_without_timestamp() {
        assert_eq!(
            derive_folder_name(["readme.txt"], "20260301_120000_Payroll_Export.zip"),
            "Payroll Export"
        );
        assert_eq!(derive_folder_name(Vec::<&str>::new(), "1700000000_Payroll.zip"), "Payroll");
        assert_eq!(derive_folder_name(Vec::<&str>::new(), "x.zip"), DEFAULT_FOLDER_NAME);
    }

    #[test]
    fn test_clean_folder_name() {
        assert_eq!(clean_folder_name("iFlow_Order__Replication").as_deref(), Some("Order Replication"));
        assert_eq!(clean_folder_name("SAP Invoice Flow").as_deref(), Some("Invoice"));
        assert_eq!(clean_folder_name("Flow"), None);
        assert_eq!(clean_folder_name("ab"), None);
    }
}
