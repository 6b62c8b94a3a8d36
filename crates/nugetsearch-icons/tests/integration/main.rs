// See <https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html>

pub mod e2e;
pub mod manager;
pub mod utils;

pub use utils::*;
