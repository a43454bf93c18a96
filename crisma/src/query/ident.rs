use std::fmt;

use crate::Error;

const MAX_IDENT_LEN: usize = 64;

/// A validated SQL identifier (table or column name).
///
/// Only `[A-Za-z0-9_$]` is accepted, which keeps caller supplied names from
/// carrying SQL into statements that interpolate them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident(String);

impl Ident {
    pub fn new(name: impl AsRef<str>) -> Result<Self, Error> {
        let name = name.as_ref();
        let valid = !name.is_empty()
            && name.len() <= MAX_IDENT_LEN
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
        if valid { Ok(Self(name.to_string())) } else { Err(Error::InvalidIdentifier(name.to_string())) }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Ident {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
