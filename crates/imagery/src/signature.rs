/// Derived key detecting "this descriptor was already applied to the map".
///
/// Always recomputed from the live descriptor via
/// [`crate::ImageryDescriptor::signature`]; never cached past the
/// descriptor's replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSignature {
    pub primary_url: String,
    pub item_count: usize,
    pub first_item_id: Option<String>,
}
