//! Datasource runtime: discovers datasource and query definitions, binds
//! mappers to validated execution, and manages session-scoped backend
//! connections.

mod datasource;
pub use datasource::{Datasource, Environment};

pub mod discovery;
pub use discovery::{scan, DatasourceConfig, DatasourceDef, QueryDef};

mod mapper;
pub use mapper::{
    map_request_fn, map_result_fn, on_completed_fn, on_issued_fn, CompletedHook, ExecuteOptions,
    IssuedHook, MapParameters, Mapper, MapperDef, MapperHooks, MapRequest, MapResult,
};

mod policy;
pub use policy::{AccessPolicy, AllowAll};

mod query;
pub use query::QuerySetting;

mod registry;
pub use registry::DriverRegistry;

mod request;
pub use request::Request;

mod runtime;
pub use runtime::{Runtime, RuntimeBuilder};

mod session;
pub use session::SessionPool;

pub use quarry_core::{
    descriptor::{source_hook, value_hook, Membership},
    driver::{
        Command, Connection, ConnectionSettings, Diagnostics, DriverFactory, HttpCommand,
        HttpMethod, Response, Rows,
    },
    validate::DescriptorMap,
    Cause, Descriptor, Error, Formatted, KindRegistry, Result, Validator,
};
