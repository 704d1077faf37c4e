//! Ranks the assets of a release against a subscription's [`AssetRuleSet`]
//! and picks the one to download.
//!
//! Selection is pure and deterministic: the same release, rules and
//! architecture always produce the same result.
//!
//! Scoring is additive over three parts:
//!
//! - extension: `(N - i) * 100` for the first preferred extension the name
//!   ends with
//! - architecture: `(N - i) * 50` for the first preferred architecture the
//!   name contains, else `25` if it contains the current architecture
//! - keywords: `10` per preferred keyword contained in the name
//!
//! Only a strictly higher score replaces the current best, so ties go to the
//! asset listed first.

mod pattern;

use ghget_model::{AssetRuleSet, InstallKind, ReleaseAsset, ReleaseInfo, SelectedAsset};

pub use pattern::Pattern;

/// Picks the best asset of `release`, or `None` when nothing survives the
/// include/exclude filters.
///
/// `architecture` overrides the detected platform architecture. Blank
/// entries in `prefer_extensions` never match, and `prefer_keywords` are
/// trimmed before matching.
pub fn select(
    release: &ReleaseInfo,
    rules: &AssetRuleSet,
    architecture: Option<&str>,
) -> Option<SelectedAsset> {
    if release.assets.is_empty() {
        return None;
    }

    let arch = match architecture.map(str::trim) {
        Some(arch) if !arch.is_empty() => arch.to_lowercase(),
        _ => ghget_platform::arch::current(),
    };
    let include = pattern::compile_all(&rules.include);
    let exclude = pattern::compile_all(&rules.exclude);

    let mut best: Option<SelectedAsset> = None;
    for asset in &release.assets {
        if !include.is_empty() && !include.iter().any(|p| p.is_match(&asset.name)) {
            continue;
        }
        if exclude.iter().any(|p| p.is_match(&asset.name)) {
            continue;
        }

        let score = score(asset, rules, &arch);
        if best.as_ref().is_none_or(|b| score > b.score) {
            best = Some(SelectedAsset {
                asset: asset.clone(),
                install_kind: InstallKind::from_file_name(&asset.name),
                score,
            });
        }
    }

    if let Some(best) = &best {
        tracing::debug!(asset = %best.asset.name, score = best.score, "selected asset");
    }
    best
}

fn score(asset: &ReleaseAsset, rules: &AssetRuleSet, arch: &str) -> i32 {
    let name = asset.name.to_lowercase();
    extension_score(&name, &rules.prefer_extensions)
        + arch_score(&name, &rules.prefer_arch, arch)
        + keyword_score(&name, &rules.prefer_keywords)
}

fn weight(len: usize, index: usize, unit: i32) -> i32 {
    i32::try_from(len - index).unwrap_or(i32::MAX / unit) * unit
}

fn extension_score(name: &str, extensions: &[String]) -> i32 {
    extensions
        .iter()
        .position(|ext| !ext.is_empty() && name.ends_with(&ext.to_lowercase()))
        .map_or(0, |i| weight(extensions.len(), i, 100))
}

fn arch_score(name: &str, preferred: &[String], current: &str) -> i32 {
    if let Some(i) = preferred
        .iter()
        .position(|a| !a.is_empty() && name.contains(&a.to_lowercase()))
    {
        return weight(preferred.len(), i, 50);
    }
    if !current.is_empty() && name.contains(current) {
        return 25;
    }
    0
}

fn keyword_score(name: &str, keywords: &[String]) -> i32 {
    let hits = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty() && name.contains(&k.to_lowercase()))
        .count();
    i32::try_from(hits).unwrap_or(i32::MAX / 10) * 10
}
