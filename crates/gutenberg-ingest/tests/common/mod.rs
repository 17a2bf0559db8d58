//! Shared helpers for gutenberg-ingest integration tests
//!
//! - descriptor builders producing realistic RDF/XML
//! - catalog archive builder (zip wrapping a tar, like the upstream feed)
//! - PostgreSQL test container with the catalog schema applied

#![allow(dead_code)]

use anyhow::{Context, Result};
use gutenberg_ingest::catalog::postgres;
use gutenberg_ingest::{AuthorStub, DbConfig, MetadataRecord};
use sqlx::PgPool;
use std::io::{Cursor, Write};
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;

// ============================================================================
// Descriptors
// ============================================================================

/// Builder for `pg<id>.rdf` documents
pub struct Descriptor {
    pub id: i64,
    pub title: String,
    pub language: Option<String>,
    pub issued: Option<String>,
    pub text_url: Option<String>,
    pub authors: Vec<(i64, String)>,
    pub shelves: Vec<String>,
}

impl Descriptor {
    pub fn new(id: i64, title: &str) -> Self {
        Self {
            id,
            title: title.to_string(),
            language: Some("en".to_string()),
            issued: Some("2001-01-01".to_string()),
            text_url: None,
            authors: Vec::new(),
            shelves: Vec::new(),
        }
    }

    pub fn text_url(mut self, url: impl Into<String>) -> Self {
        self.text_url = Some(url.into());
        self
    }

    pub fn author(mut self, agent_id: i64, name: &str) -> Self {
        self.authors.push((agent_id, name.to_string()));
        self
    }

    pub fn shelf(mut self, name: &str) -> Self {
        self.shelves.push(name.to_string());
        self
    }

    pub fn to_xml(&self) -> String {
        let mut body = String::new();
        body.push_str(&format!("<dcterms:title>{}</dcterms:title>\n", self.title));
        if let Some(issued) = &self.issued {
            body.push_str(&format!("<dcterms:issued>{}</dcterms:issued>\n", issued));
        }
        if let Some(language) = &self.language {
            body.push_str(&format!(
                "<dcterms:language><rdf:Description><rdf:value>{}</rdf:value></rdf:Description></dcterms:language>\n",
                language
            ));
        }
        for (agent_id, name) in &self.authors {
            body.push_str(&format!(
                r#"<dcterms:creator><pgterms:agent rdf:about="2009/agents/{}"><pgterms:name>{}</pgterms:name></pgterms:agent></dcterms:creator>
"#,
                agent_id, name
            ));
        }
        for shelf in &self.shelves {
            body.push_str(&format!(
                "<pgterms:bookshelf><rdf:Description><rdf:value>{}</rdf:value></rdf:Description></pgterms:bookshelf>\n",
                shelf
            ));
        }
        if let Some(url) = &self.text_url {
            body.push_str(&format!(
                r#"<dcterms:hasFormat><pgterms:file rdf:about="{}"><dcterms:format><rdf:Description><rdf:value>text/plain; charset=us-ascii</rdf:value></rdf:Description></dcterms:format></pgterms:file></dcterms:hasFormat>
"#,
                url
            ));
        }

        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<rdf:RDF xmlns:dcterms="http://purl.org/dc/terms/"
         xmlns:pgterms="http://www.gutenberg.org/2009/pgterms/"
         xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
<pgterms:ebook rdf:about="ebooks/{}">
{}</pgterms:ebook>
</rdf:RDF>
"#,
            self.id, body
        )
    }
}

/// Metadata record as the parser would produce it
pub fn record(id: i64, title: &str) -> MetadataRecord {
    MetadataRecord::new(id, title)
}

pub fn author(external_id: Option<i64>, name: &str) -> AuthorStub {
    AuthorStub {
        external_id,
        name: name.to_string(),
        birth_year: None,
        death_year: None,
    }
}

/// Plain-text edition wrapped in the usual start/end markers
pub fn gutenberg_text(title: &str, body: &str) -> String {
    format!(
        "The Project Gutenberg eBook of {title}\n\n\
         *** START OF THE PROJECT GUTENBERG EBOOK {upper} ***\n\
         {body}\n\
         *** END OF THE PROJECT GUTENBERG EBOOK {upper} ***\n\
         License text follows.\n",
        upper = title.to_uppercase()
    )
}

// ============================================================================
// Archives
// ============================================================================

/// Build an `rdf-files.tar.zip` holding the given `(relative path, contents)`
/// entries inside its tar member
pub fn catalog_archive(entries: &[(String, String)]) -> Vec<u8> {
    let mut tar = tar::Builder::new(Vec::new());
    for (path, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        tar.append_data(&mut header, path, contents.as_bytes())
            .expect("append tar entry");
    }
    let tar_bytes = tar.into_inner().expect("finish tar");

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file("rdf-files.tar", zip::write::SimpleFileOptions::default())
        .expect("start zip entry");
    zip.write_all(&tar_bytes).expect("write zip entry");
    zip.finish().expect("finish zip").into_inner()
}

/// Archive entry for a descriptor at its upstream location
pub fn descriptor_entry(descriptor: &Descriptor) -> (String, String) {
    (
        format!("cache/epub/{id}/pg{id}.rdf", id = descriptor.id),
        descriptor.to_xml(),
    )
}

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

/// PostgreSQL container with the catalog schema applied
pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    pool: PgPool,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let config = DbConfig {
            url: format!("postgresql://postgres:postgres@{}:{}/postgres", host, port),
            max_connections: 2,
            connect_timeout_secs: 30,
        };
        let pool = postgres::connect(&config)
            .await
            .context("Failed to connect and migrate")?;

        Ok(Self {
            _container: container,
            pool,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
