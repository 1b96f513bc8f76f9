//! Component name normalization.
//!
//! A submitted component file `Data_Loader.tar.gz` is identified inside
//! its pipeline as `data-loader`: the stem before the first `.`,
//! lower-cased, with `_` replaced by `-`.

/// Normalize a submitted filename into a component name.
///
/// Returns `None` when nothing usable remains (e.g. `".hidden"` or `""`).
pub fn normalize_component_name(filename: &str) -> Option<String> {
    let stem = filename.split('.').next().unwrap_or_default();
    let name = stem.trim().to_lowercase().replace('_', "-");
    if name.is_empty() { None } else { Some(name) }
}
