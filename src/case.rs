//! Case conversion for display names in paths and for override file names.

use convert_case::{Case, Casing};

/// How model and association names are rendered into path segments.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NameCase {
    /// Use names as declared (e.g. "productCategories").
    #[default]
    Preserve,
    /// snake_case names (e.g. "product_categories").
    Snake,
}

impl NameCase {
    pub fn from_snake_flag(snake_case: bool) -> Self {
        if snake_case {
            NameCase::Snake
        } else {
            NameCase::Preserve
        }
    }

    pub fn apply(self, name: &str) -> String {
        match self {
            NameCase::Preserve => name.to_string(),
            NameCase::Snake => to_snake_case(name),
        }
    }
}

/// "productCategory" -> "product_category"
pub fn to_snake_case(s: &str) -> String {
    s.to_case(Case::Snake)
}

/// "product_category" -> "productCategory"
pub fn to_camel_case(s: &str) -> String {
    s.to_case(Case::Camel)
}

/// Model name for an override file stem.
/// Anything after the first '.' is dropped, so "productCategory.3" names "productCategory".
/// Stems with an underscore past the first character are camel-cased; "_default" is kept.
pub fn model_name_from_stem(stem: &str) -> String {
    let name = stem.split('.').next().unwrap_or(stem);
    match name.find('_') {
        None | Some(0) => name.to_string(),
        Some(_) => to_camel_case(name),
    }
}
