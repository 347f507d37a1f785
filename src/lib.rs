#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

mod client;
mod cmap;
mod cursor;
pub mod error;
pub mod query;
#[cfg(test)]
mod test;

pub use crate::{
    client::{
        options::{ClientOptions, Env, PoolOptions, ResponseDataType, ServerAddress},
        Client,
        QueryResponse,
    },
    cursor::QueryStream,
    error::{Error, ErrorKind, Result},
    query::{
        filter::{Condition, Operand, Value},
        Document,
        Query,
        QueryKind,
        SortOrder,
    },
};

/// A boxed future.
pub(crate) type BoxFuture<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;
