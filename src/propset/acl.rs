use roaring::RoaringBitmap;
use crate::core::error::Result;
use crate::index::index_reader::IndexReader;
use crate::mapper::document_mapper::DocumentMapper;
use crate::mapper::field_names::ALL_PRINCIPALS;

/// Builds the query-time read filter for a security token.
/// Authorization rules live with the implementor; the index only stores
/// the read principals of each property set.
pub trait AclFilterFactory: Send + Sync {
    /// Documents the token may read, or `None` when it may read everything
    fn filter(&self, token: Option<&str>, reader: &IndexReader) -> Result<Option<RoaringBitmap>>;
}

/// Filter from the principals a resolver assigns to a token
pub struct PrincipalFilter<F> {
    resolve: F,
}

impl<F> PrincipalFilter<F>
where
    F: Fn(Option<&str>) -> Option<Vec<String>> + Send + Sync,
{
    /// `resolve` returns `None` for tokens that bypass read checks
    pub fn new(resolve: F) -> Self {
        PrincipalFilter { resolve }
    }
}

impl<F> AclFilterFactory for PrincipalFilter<F>
where
    F: Fn(Option<&str>) -> Option<Vec<String>> + Send + Sync,
{
    fn filter(&self, token: Option<&str>, reader: &IndexReader) -> Result<Option<RoaringBitmap>> {
        let Some(principals) = (self.resolve)(token) else {
            return Ok(None);
        };

        let mut allowed = reader.term_docs(&DocumentMapper::principal_term(ALL_PRINCIPALS));
        for principal in &principals {
            allowed |= reader.term_docs(&DocumentMapper::principal_term(principal));
        }
        Ok(Some(allowed))
    }
}
