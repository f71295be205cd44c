/// Header metadata of a catalog document.
///
/// Only `name`, `description` and `version` are common to every format; the
/// rest round-trip when present and serialize as empty otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatHeader {
    pub name: String,
    pub description: String,
    pub version: String,
    pub author: Option<String>,
    pub date: Option<String>,
    pub homepage: Option<String>,
    pub url: Option<String>,
    pub comment: Option<String>,
}

impl DatHeader {
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            description: name.clone(),
            name,
            ..Self::default()
        }
    }
}
