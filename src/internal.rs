mod registry;

pub(crate) use registry::{Registration, Registry, Target};
