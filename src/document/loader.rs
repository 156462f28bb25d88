use std::{borrow::Cow, path::Path, string::FromUtf8Error};

use compio::fs;
use hashlink::LinkedHashMap;
use saphyr::{LoadableYamlNode, Scalar, Yaml};
use snafu::prelude::*;
use tracing::debug;

use super::{ChildReference, ChildTarget, Document, EntryDescription};
use crate::ext::BestEffortPathExt;

pub const DEFAULT_DOCUMENT_FILE_NAME: &str = "input.json";

const IDENTITY_KEY: &str = "inode";
const TYPE_KEY: &str = "type";
const CONTENT_KEY: &str = "data";
const CHILDREN_KEY: &str = "entries";
const NAME_KEY: &str = "name";

/// Deepest chain of inline children accepted in one document. Deeper trees
/// can still be described by linking top-level entries.
pub const MAX_INLINE_DEPTH: usize = 128;

impl Document {
    pub async fn from_path(path: &Path) -> Result<Self, DocumentLoadError> {
        debug!("Reading tree document: {}", path.best_effort_path_display());
        let bytes = fs::read(path).await.context(ReadSnafu {
            file_path: path.best_effort_path_display(),
        })?;
        debug!("Successfully read tree document: {} bytes", bytes.len());

        let contents = String::from_utf8(bytes).context(EncodingSnafu {
            file_path: path.best_effort_path_display(),
        })?;
        contents.as_str().try_into()
    }
}

impl TryFrom<&str> for Document {
    type Error = DocumentLoadError;

    /// Parses a document from YAML. JSON documents are accepted as well,
    /// since YAML flow syntax is a superset of JSON.
    fn try_from(contents: &str) -> Result<Self, Self::Error> {
        let documents = Yaml::load_from_str(contents).context(ParseSnafu)?;
        let top_level = documents.first().context(EmptyDocumentSnafu)?;

        let entries = if let Some(sequence) = top_level.as_sequence() {
            sequence
        } else if let Some(mapping) = top_level.as_mapping() {
            field(mapping, CHILDREN_KEY)
                .context(MissingFieldSnafu {
                    location: "document",
                    field: CHILDREN_KEY,
                })?
                .as_sequence()
                .context(NotASequenceSnafu {
                    location: CHILDREN_KEY,
                })?
        } else {
            return TopLevelNotSequenceSnafu.fail();
        };

        let entries = entries
            .iter()
            .enumerate()
            .map(|(index, item)| {
                parse_description(item, &format!("{CHILDREN_KEY}[{index}]"), true, 0)
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Parsed {} top-level entry descriptions", entries.len());
        Ok(Document { entries })
    }
}

fn field<'a, 'input>(
    mapping: &'a LinkedHashMap<Yaml<'input>, Yaml<'input>>,
    key: &'static str,
) -> Option<&'a Yaml<'input>> {
    mapping
        .get(&Yaml::Value(Scalar::String(Cow::Borrowed(key))))
        .filter(|value| !matches!(value, Yaml::Value(Scalar::Null)))
}

fn string_field(
    mapping: &LinkedHashMap<Yaml, Yaml>,
    key: &'static str,
    location: &str,
) -> Result<Option<String>, DocumentLoadError> {
    field(mapping, key)
        .map(|value| {
            value
                .as_str()
                .map(str::to_string)
                .context(InvalidFieldSnafu {
                    location,
                    field: key,
                    expected: "a string",
                })
        })
        .transpose()
}

fn identity_field(
    mapping: &LinkedHashMap<Yaml, Yaml>,
    location: &str,
) -> Result<Option<u64>, DocumentLoadError> {
    let Some(value) = field(mapping, IDENTITY_KEY) else {
        return Ok(None);
    };
    match value {
        Yaml::Value(Scalar::Integer(number)) => u64::try_from(*number)
            .map(Some)
            .map_err(|_| DocumentLoadError::NegativeIdentity {
                location: location.to_string(),
                value: *number,
            }),
        _ => InvalidFieldSnafu {
            location,
            field: IDENTITY_KEY,
            expected: "a non-negative integer",
        }
        .fail(),
    }
}

fn parse_description(
    item: &Yaml,
    location: &str,
    requires_identity: bool,
    depth: usize,
) -> Result<EntryDescription, DocumentLoadError> {
    ensure!(
        depth <= MAX_INLINE_DEPTH,
        NestingTooDeepSnafu {
            location,
            limit: MAX_INLINE_DEPTH,
        }
    );
    let mapping = item.as_mapping().context(NotAMappingSnafu { location })?;

    let identity = identity_field(mapping, location)?;
    if requires_identity && identity.is_none() {
        return MissingFieldSnafu {
            location,
            field: IDENTITY_KEY,
        }
        .fail();
    }

    let type_tag = string_field(mapping, TYPE_KEY, location)?.context(MissingFieldSnafu {
        location,
        field: TYPE_KEY,
    })?;
    let content = string_field(mapping, CONTENT_KEY, location)?;

    let children = field(mapping, CHILDREN_KEY)
        .map(|value| {
            let children_location = format!("{location}.{CHILDREN_KEY}");
            value
                .as_sequence()
                .context(NotASequenceSnafu {
                    location: children_location.as_str(),
                })?
                .iter()
                .enumerate()
                .map(|(index, child)| {
                    parse_child(child, &format!("{children_location}[{index}]"), depth)
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?;

    Ok(EntryDescription {
        identity,
        type_tag,
        content,
        children,
    })
}

/// A child carrying its own `type` is an inline description, anything else
/// must link to a top-level description through its identity.
fn parse_child(
    item: &Yaml,
    location: &str,
    depth: usize,
) -> Result<ChildReference, DocumentLoadError> {
    let mapping = item.as_mapping().context(NotAMappingSnafu { location })?;

    let name = string_field(mapping, NAME_KEY, location)?.context(MissingFieldSnafu {
        location,
        field: NAME_KEY,
    })?;

    let target = if field(mapping, TYPE_KEY).is_some() {
        ChildTarget::Inline(Box::new(parse_description(
            item,
            location,
            false,
            depth + 1,
        )?))
    } else {
        let identity = identity_field(mapping, location)?.context(MissingFieldSnafu {
            location,
            field: IDENTITY_KEY,
        })?;
        ChildTarget::Linked(identity)
    };

    Ok(ChildReference { name, target })
}

#[derive(Debug, Snafu)]
pub enum DocumentLoadError {
    #[snafu(display("Failed to read the tree document: {}", file_path))]
    ReadError {
        file_path: String,
        source: std::io::Error,
    },
    #[snafu(display("The tree document {} is not valid UTF-8", file_path))]
    EncodingError {
        file_path: String,
        source: FromUtf8Error,
    },
    #[snafu(display("Failed to parse the tree document"))]
    ParseError { source: saphyr::ScanError },
    #[snafu(display("The tree document is empty"))]
    EmptyDocument,
    #[snafu(display(
        "Top level of the tree document should be a sequence of entries or a map with an 'entries' key"
    ))]
    TopLevelNotSequence,
    #[snafu(display("'{}' should be a sequence", location))]
    NotASequence { location: String },
    #[snafu(display("'{}' should be a map", location))]
    NotAMapping { location: String },
    #[snafu(display("'{}' is missing the '{}' field", location, field))]
    MissingField {
        location: String,
        field: &'static str,
    },
    #[snafu(display("Field '{}' of '{}' should be {}", field, location, expected))]
    InvalidField {
        location: String,
        field: &'static str,
        expected: &'static str,
    },
    #[snafu(display("'{}' has a negative identity: {}", location, value))]
    NegativeIdentity { location: String, value: i64 },
    #[snafu(display("'{}' nests inline entries deeper than {} levels", location, limit))]
    NestingTooDeep { location: String, limit: usize },
}
