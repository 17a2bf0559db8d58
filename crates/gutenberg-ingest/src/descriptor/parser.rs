// RDF descriptor parser
//
// Extraction rules (all lookups are "first descendant match" unless noted):
// - external id: pgterms:ebook/@rdf:about, last '/' segment as integer
// - title: dcterms:title, summary: pgterms:marc520, release: dcterms:issued
// - language: dcterms:language/rdf:Description/rdf:value
// - categories: every pgterms:bookshelf value, minus "Browsing:" shelves
// - authors: every dcterms:creator with a pgterms:name
// - text resource: first pgterms:file whose format starts with text/plain

use std::path::Path;
use tracing::debug;

use super::xml::{Element, DCTERMS, PGTERMS, RDF};
use super::{AuthorStub, MetadataRecord};
use crate::error::DescriptorError;

const ABOUT: (&str, &str) = (RDF, "about");
const BROWSING_SHELF: &str = "Browsing";
const PLAIN_TEXT_FORMAT: &str = "text/plain";

/// Parse a descriptor document
pub fn parse(document: &str) -> Result<MetadataRecord, DescriptorError> {
    let root = Element::parse(document)?;

    let external_id = root
        .find(&[(PGTERMS, "ebook")])
        .and_then(|ebook| ebook.attribute(ABOUT))
        .and_then(trailing_id)
        .ok_or(DescriptorError::Incomplete("external_id"))?;

    let title = root
        .find_text(&[(DCTERMS, "title")])
        .map(str::to_string)
        .ok_or(DescriptorError::Incomplete("title"))?;

    let record = MetadataRecord {
        external_id,
        title,
        language: root
            .find_text(&[(DCTERMS, "language"), (RDF, "Description"), (RDF, "value")])
            .map(str::to_string),
        release_date: root.find_text(&[(DCTERMS, "issued")]).map(str::to_string),
        summary: root.find_text(&[(PGTERMS, "marc520")]).map(str::to_string),
        text_resource_url: text_resource_url(&root),
        authors: authors(&root),
        categories: categories(&root),
    };

    debug!(
        external_id = record.external_id,
        authors = record.authors.len(),
        categories = record.categories.len(),
        "Parsed descriptor"
    );

    Ok(record)
}

/// Read and parse a descriptor file
pub fn parse_file(path: &Path) -> Result<MetadataRecord, DescriptorError> {
    let document = std::fs::read_to_string(path).map_err(|source| DescriptorError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&document)
}

/// `ebooks/84` -> 84, `2009/agents/35` -> 35
fn trailing_id(about: &str) -> Option<i64> {
    about.rsplit('/').next()?.trim().parse().ok()
}

fn parse_year(text: Option<&str>) -> Option<i32> {
    text?.trim().parse().ok()
}

fn categories(root: &Element) -> Vec<String> {
    root.find_all(&[(PGTERMS, "bookshelf"), (RDF, "Description"), (RDF, "value")])
        .into_iter()
        .filter_map(Element::text)
        .filter(|shelf| shelf.split(':').next() != Some(BROWSING_SHELF))
        .map(str::to_string)
        .collect()
}

fn authors(root: &Element) -> Vec<AuthorStub> {
    root.find_all(&[(DCTERMS, "creator")])
        .into_iter()
        .filter_map(|creator| {
            let name = creator.find_text(&[(PGTERMS, "name")])?;
            Some(AuthorStub {
                external_id: creator
                    .find(&[(PGTERMS, "agent")])
                    .and_then(|agent| agent.attribute(ABOUT))
                    .and_then(trailing_id),
                name: name.to_string(),
                birth_year: parse_year(creator.find_text(&[(PGTERMS, "birthdate")])),
                death_year: parse_year(creator.find_text(&[(PGTERMS, "deathdate")])),
            })
        })
        .collect()
}

fn text_resource_url(root: &Element) -> Option<String> {
    root.find_all(&[(PGTERMS, "file")])
        .into_iter()
        .find(|file| {
            file.find_text(&[(DCTERMS, "format"), (RDF, "Description"), (RDF, "value")])
                .is_some_and(|format| format.starts_with(PLAIN_TEXT_FORMAT))
        })
        .and_then(|file| file.attribute(ABOUT))
        .map(str::to_string)
}
