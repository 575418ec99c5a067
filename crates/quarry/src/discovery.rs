//! Filesystem discovery of datasource and query definitions.
//!
//! A datasource is any directory holding a `datasource.json`; its name is the
//! directory name. Query-definition files under that directory load as raw
//! query text (`.url` files parse as HTTP commands), and a sibling
//! `<base>.mappers.json` declares the query's mappers as data. The scan runs
//! once at startup and produces eager definitions; nothing is ever loaded
//! from a path derived at request time.

use crate::datasource::Environment;
use crate::mapper::MapperDef;

use quarry_core::{
    driver::{Command, ConnectionSettings, HttpCommand},
    Error, Result,
};

use serde::Deserialize;

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

/// Extensions recognized as query-definition files.
pub const QUERY_EXTENSIONS: &[&str] = &["sql", "url", "json", "xml", "xpath", "xquery"];

const DATASOURCE_FILE: &str = "datasource.json";
const MAPPER_SUFFIX: &str = ".mappers";

/// Contents of a `datasource.json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DatasourceConfig {
    pub environment: Environment,
    pub connections: Vec<ConnectionSettings>,
    /// Connection used by mappers that do not name one. Defaults to the
    /// first declared connection.
    pub default_connection: Option<String>,
}

/// A discovered (or programmatically declared) datasource definition,
/// consumed by the runtime builder.
#[derive(Debug, Clone)]
pub struct DatasourceDef {
    pub name: String,
    pub config: DatasourceConfig,
    pub queries: Vec<QueryDef>,
}

impl DatasourceDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: DatasourceConfig::default(),
            queries: vec![],
        }
    }

    pub fn environment(mut self, environment: Environment) -> Self {
        self.config.environment = environment;
        self
    }

    pub fn connection(mut self, settings: ConnectionSettings) -> Self {
        self.config.connections.push(settings);
        self
    }

    pub fn default_connection(mut self, name: impl Into<String>) -> Self {
        self.config.default_connection = Some(name.into());
        self
    }

    pub fn query(mut self, query: QueryDef) -> Self {
        self.queries.push(query);
        self
    }
}

/// One query definition: the raw command plus its declared mappers.
#[derive(Debug, Clone)]
pub struct QueryDef {
    pub name: String,
    pub command: Command,
    pub mappers: Vec<MapperDef>,
}

impl QueryDef {
    pub fn sql(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: Command::Sql(text.into()),
            mappers: vec![],
        }
    }

    /// Parses the literal eagerly; a malformed command fails here, at
    /// declaration time.
    pub fn http(name: impl Into<String>, literal: &str) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            command: Command::Http(HttpCommand::parse(literal)?),
            mappers: vec![],
        })
    }

    pub fn mapper(mut self, def: MapperDef) -> Self {
        self.mappers.push(def);
        self
    }
}

/// Recursively collects paths under `root` accepted by `matches`. With
/// `only_files`, directories are traversed but never returned.
pub fn list_files_recursively(
    root: &Path,
    matches: &dyn Fn(&Path) -> bool,
    only_files: bool,
) -> Result<Vec<PathBuf>> {
    let mut found = vec![];
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path.clone());
                if only_files {
                    continue;
                }
            }
            if matches(&path) {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}

fn is_query_file(path: &Path) -> bool {
    let Some(extension) = path.extension().and_then(OsStr::to_str) else {
        return false;
    };
    if !QUERY_EXTENSIONS.contains(&extension) {
        return false;
    }
    if path.file_name() == Some(OsStr::new(DATASOURCE_FILE)) {
        return false;
    }
    // `<base>.mappers.json` files belong to their query file.
    !path
        .file_stem()
        .and_then(OsStr::to_str)
        .is_some_and(|stem| stem.ends_with(MAPPER_SUFFIX))
}

/// Scans `root` for datasource definitions.
///
/// Missing or malformed definition files surface as configuration errors
/// here, at startup, never at request time.
pub fn scan(root: &Path) -> Result<Vec<DatasourceDef>> {
    let definition_files = list_files_recursively(
        root,
        &|path| path.file_name() == Some(OsStr::new(DATASOURCE_FILE)),
        true,
    )?;

    let mut defs = vec![];
    for definition in definition_files {
        let dir = definition
            .parent()
            .ok_or_else(|| Error::configuration("datasource definition has no parent directory"))?;
        let name = dir
            .file_name()
            .ok_or_else(|| Error::configuration("datasource directory has no name"))?
            .to_string_lossy()
            .into_owned();

        let config: DatasourceConfig = serde_json::from_str(&fs::read_to_string(&definition)?)
            .map_err(|err| {
                Error::configuration(format!("malformed {}: {err}", definition.display()))
            })?;

        let mut queries = vec![];
        for query_file in list_files_recursively(dir, &is_query_file, true)? {
            queries.push(load_query(&query_file)?);
        }

        tracing::debug!(
            datasource = name.as_str(),
            queries = queries.len(),
            "discovered datasource"
        );
        defs.push(DatasourceDef {
            name,
            config,
            queries,
        });
    }

    Ok(defs)
}

fn load_query(path: &Path) -> Result<QueryDef> {
    let name = path
        .file_stem()
        .and_then(OsStr::to_str)
        .ok_or_else(|| {
            Error::configuration(format!("query file {} has no stem", path.display()))
        })?
        .to_string();

    let text = fs::read_to_string(path)?;
    let command = match path.extension().and_then(OsStr::to_str) {
        Some("url") => Command::Http(HttpCommand::parse(&text)?),
        _ => Command::Sql(text),
    };

    let mapper_file = path.with_file_name(format!("{name}{MAPPER_SUFFIX}.json"));
    let mappers = if mapper_file.exists() {
        serde_json::from_str(&fs::read_to_string(&mapper_file)?).map_err(|err| {
            Error::configuration(format!("malformed {}: {err}", mapper_file.display()))
        })?
    } else {
        vec![]
    };

    Ok(QueryDef {
        name,
        command,
        mappers,
    })
}
