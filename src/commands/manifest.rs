// src/commands/manifest.rs

//! Manifest inspection commands

use anyhow::{Context, Result};
use pkgdepot::manifest::{variant_filter, ActionFilter, SearchRef};
use pkgdepot::Manifest;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

fn read_manifest(path: &Path) -> Result<Manifest> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    let mut manifest = Manifest::new();
    manifest
        .set_content(&text)
        .with_context(|| format!("Failed to parse manifest {}", path.display()))?;
    Ok(manifest)
}

fn parse_variants(specs: &[String]) -> Result<BTreeMap<String, String>> {
    specs
        .iter()
        .map(|spec| {
            let (name, value) = spec
                .split_once('=')
                .with_context(|| format!("Variant '{}' must be name=value", spec))?;
            let name = if name.starts_with("variant.") {
                name.to_string()
            } else {
                format!("variant.{}", name)
            };
            Ok((name, value.to_string()))
        })
        .collect()
}

/// Show the actions added, changed and removed going from `old` to `new`
pub fn cmd_diff(old: &Path, new: &Path, variants: &[String]) -> Result<()> {
    let origin = read_manifest(old)?;
    let dest = read_manifest(new)?;

    let variants = parse_variants(variants)?;
    let filter = variant_filter(&variants);
    let excludes: [ActionFilter<'_>; 1] = [&filter];

    let diff = dest.difference(&origin, &excludes, &excludes);
    if diff.is_empty() {
        println!("No differences.");
        return Ok(());
    }

    print!("{}", dest.humanized_differences(&origin, &excludes, &excludes));
    println!(
        "\n{} added, {} changed, {} removed",
        diff.added.len(),
        diff.changed.len(),
        diff.removed.len()
    );
    Ok(())
}

/// List actions that share a key but differ in content
pub fn cmd_duplicates(path: &Path) -> Result<()> {
    let manifest = read_manifest(path)?;
    let groups = manifest.duplicates(&[]);

    if groups.is_empty() {
        println!("No duplicate actions.");
        return Ok(());
    }

    for group in &groups {
        println!("{} {}:", group.kind.as_ref(), group.key);
        for action in &group.actions {
            println!("  {}", action);
        }
    }
    println!("\n{} duplicated keys", groups.len());
    Ok(())
}

/// Look up a token in the manifest's search index
pub fn cmd_search(path: &Path, token: &str, token_type: Option<&str>) -> Result<()> {
    let index = Manifest::search_dict_file(path, &[])
        .with_context(|| format!("Failed to index {}", path.display()))?;

    let hits: Vec<(&str, &SearchRef)> = match token_type {
        Some(ty) => index.lookup(ty, token).iter().map(|r| (ty, r)).collect(),
        None => index.lookup_any(token).collect(),
    };

    if hits.is_empty() {
        println!("No matches for '{}'.", token);
        return Ok(());
    }

    println!("{:<16} {:<10} VALUE", "INDEX", "ACTION");
    for (ty, hit) in hits {
        println!("{:<16} {:<10} {}", ty, hit.action_name, hit.full_value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variants() {
        let parsed = parse_variants(&["arch=sparc".to_string(), "variant.debug=true".to_string()]).unwrap();
        assert_eq!(parsed.get("variant.arch").map(String::as_str), Some("sparc"));
        assert_eq!(parsed.get("variant.debug").map(String::as_str), Some("true"));
        assert!(parse_variants(&["arch".to_string()]).is_err());
    }
}
