use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::AppError;

use super::catalog::ColumnDescriptor;

/// The semantic category of the identifier being deleted. Each kind owns a
/// fixed, ordered set of column-name aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyKind {
    OrderNumber,
    RecordNumber,
    PrimaryKey,
    Identity,
}

const ORDER_NUMBER_ALIASES: &[&str] = &["adisyonno", "adisyon_no", "ADISYONNO"];
const RECORD_NUMBER_ALIASES: &[&str] = &["kayitno", "kayit_no", "KAYITNO", "recordno"];
const PRIMARY_KEY_ALIASES: &[&str] = &["Anahtar", "anahtar", "ANAHTAR", "ID", "id"];
const IDENTITY_ALIASES: &[&str] = &["Kimlik", "kimlik", "KIMLIK", "ID", "id"];

impl KeyKind {
    pub const ALL: [KeyKind; 4] = [
        KeyKind::OrderNumber,
        KeyKind::RecordNumber,
        KeyKind::PrimaryKey,
        KeyKind::Identity,
    ];

    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            KeyKind::OrderNumber => ORDER_NUMBER_ALIASES,
            KeyKind::RecordNumber => RECORD_NUMBER_ALIASES,
            KeyKind::PrimaryKey => PRIMARY_KEY_ALIASES,
            KeyKind::Identity => IDENTITY_ALIASES,
        }
    }

    /// The tag the point-of-sale staff use for this kind.
    pub fn tag(self) -> &'static str {
        match self {
            KeyKind::OrderNumber => "adisyonno",
            KeyKind::RecordNumber => "kayitno",
            KeyKind::PrimaryKey => "anahtar",
            KeyKind::Identity => "kimlik",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            KeyKind::OrderNumber => "order-number",
            KeyKind::RecordNumber => "record-number",
            KeyKind::PrimaryKey => "primary-key",
            KeyKind::Identity => "identity",
        }
    }

    pub fn matches_column(self, column_name: &str) -> bool {
        self.aliases()
            .iter()
            .any(|alias| alias.eq_ignore_ascii_case(column_name))
    }

    /// Returns every column of one table whose name is an alias of this kind,
    /// in catalog order. Several matches are all kept as separate targets.
    pub fn candidate_columns(self, columns: &[ColumnDescriptor]) -> Vec<&ColumnDescriptor> {
        columns
            .iter()
            .filter(|column| self.matches_column(column.name()))
            .collect()
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unsupported key kind `{0}`; expected one of adisyonno, kayitno, anahtar, kimlik")]
pub struct KeyKindParseError(pub String);

impl From<KeyKindParseError> for AppError {
    fn from(error: KeyKindParseError) -> Self {
        let value = error.0.clone();
        AppError::new("DEEP_DELETE/UNSUPPORTED_KIND", error.to_string()).with_context("kind", value)
    }
}

impl FromStr for KeyKind {
    type Err = KeyKindParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        KeyKind::ALL
            .into_iter()
            .find(|kind| kind.tag() == normalized || kind.as_str() == normalized)
            .ok_or_else(|| KeyKindParseError(raw.to_string()))
    }
}
