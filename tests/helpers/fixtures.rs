/// Item and page builders shared by the pipeline tests
use aws_sdk_dynamodb::types::{AttributeValue, WriteRequest};
use flow::table::{Item, Page};

/// Key attribute of every fixture table
pub const KEY: &str = "id";

/// An item with key `id-<n>` and a non-key payload
pub fn item(n: usize) -> Item {
    Item::from([
        (KEY.to_string(), AttributeValue::S(format!("id-{n}"))),
        ("payload".to_string(), AttributeValue::N(n.to_string())),
    ])
}

/// Just the key of [`item`]
pub fn key(n: usize) -> Item {
    Item::from([(KEY.to_string(), AttributeValue::S(format!("id-{n}")))])
}

/// Scan pages with the given sizes and consecutive item numbers
///
/// Every page but the last carries a continuation key.
pub fn pages(sizes: &[usize]) -> Vec<Page> {
    let mut next = 0;
    sizes
        .iter()
        .enumerate()
        .map(|(i, &size)| {
            let items = (next..next + size).map(item).collect();
            next += size;
            let last_key = (i + 1 < sizes.len()).then(|| key(next.saturating_sub(1)));
            Page::new(items, last_key)
        })
        .collect()
}

/// The key value a write request targets
pub fn request_id(request: &WriteRequest) -> String {
    let attributes = request
        .put_request()
        .map(|put| put.item())
        .or_else(|| request.delete_request().map(|delete| delete.key()))
        .expect("write request without put or delete");
    match attributes.get(KEY) {
        Some(AttributeValue::S(id)) => id.clone(),
        other => panic!("unexpected key attribute {other:?}"),
    }
}

/// Whether a write request is a delete
pub fn is_delete(request: &WriteRequest) -> bool {
    request.delete_request().is_some()
}
