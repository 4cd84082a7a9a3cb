pub mod field_names;
pub mod document_mapper;
