// RDF descriptor handling
//
// Each book in the catalog archive is described by one RDF/XML file under
// cache/epub/<id>/pg<id>.rdf. The parser turns a descriptor into a
// MetadataRecord, the transient input of reconciliation.

pub mod parser;
pub mod xml;

use serde::{Deserialize, Serialize};

pub use parser::{parse, parse_file};

/// Author as named by a descriptor, before it is matched against the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorStub {
    pub external_id: Option<i64>,
    pub name: String,
    pub birth_year: Option<i32>,
    pub death_year: Option<i32>,
}

/// Metadata extracted from one descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub external_id: i64,
    pub title: String,
    pub language: Option<String>,
    pub release_date: Option<String>,
    pub summary: Option<String>,
    pub text_resource_url: Option<String>,
    pub authors: Vec<AuthorStub>,
    pub categories: Vec<String>,
}

impl MetadataRecord {
    /// Record with only the required fields set
    pub fn new(external_id: i64, title: impl Into<String>) -> Self {
        Self {
            external_id,
            title: title.into(),
            language: None,
            release_date: None,
            summary: None,
            text_resource_url: None,
            authors: Vec::new(),
            categories: Vec::new(),
        }
    }
}
