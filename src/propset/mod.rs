pub mod path;
pub mod model;
pub mod acl;
pub mod index;
