mod organize;
pub mod support;
