//! Composable query computations.
//!
//! A [`Queries<T, S>`] is a pending database operation that yields a `T` when run against a
//! state `S`, usually a [`ConnectionContext`](crate::db::ConnectionContext). Build one from a
//! [`CommandFactory`], compose with `map`, `and_then` and `zip`, select a backend with
//! [`CommandFactory::or`], then hand it to a driver:
//!
//! ```ignore
//! let count = CommandFactory::from_file("count_users", [])
//!     .fetch_scalar()
//!     .map(|v| v.as_ref().and_then(value_to_i64).unwrap_or(0));
//! let total = count.run_with_transaction(&source).await?;
//! ```

mod alternation;
mod computation;
pub(crate) mod driver;
mod factory;
mod stream;

pub use alternation::{OneOf2, OneOf3, first3, second3, third3};
pub use computation::Queries;
pub use factory::CommandFactory;
