use http::HeaderMap;

use crate::protocol::HeaderFragment;

/// Collects header fragments that the tokenizer flushes in several batches
/// before the head is complete.
///
/// The accumulator lives only between the first flushed batch and the
/// headers-complete event; [`HeaderAccumulator::finish`] consumes it.
#[derive(Debug, Default)]
pub struct HeaderAccumulator {
    fields: Vec<HeaderFragment>,
    url: String,
}

impl HeaderAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a batch of fields and, if present, the next piece of the url.
    pub fn append<I>(&mut self, fragments: I, url: Option<&str>)
    where
        I: IntoIterator<Item = HeaderFragment>,
    {
        self.fields.extend(fragments);
        if let Some(url) = url {
            self.url.push_str(url);
        }
    }

    /// Number of fields collected so far.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Folds the collected fields into a map, the last value of a repeated
    /// name wins, and returns it together with the complete url.
    pub fn finish(self) -> (HeaderMap, String) {
        let mut headers = HeaderMap::with_capacity(self.fields.len());
        fold_into(&mut headers, self.fields);
        (headers, self.url)
    }
}

pub(crate) fn fold_into<I>(headers: &mut HeaderMap, fragments: I)
where
    I: IntoIterator<Item = HeaderFragment>,
{
    for (name, value) in fragments {
        headers.insert(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderName, HeaderValue};

    fn field(name: &'static str, value: &'static str) -> HeaderFragment {
        (HeaderName::from_static(name), HeaderValue::from_static(value))
    }

    #[test]
    fn joins_batches_and_url_pieces() {
        let mut accumulator = HeaderAccumulator::new();
        accumulator.append([field("host", "example.com"), field("accept", "*/*")], Some("/index"));
        accumulator.append([field("user-agent", "curl/8.0")], Some(".html?a=1"));
        accumulator.append(Vec::new(), None);

        assert_eq!(accumulator.len(), 3);

        let (headers, url) = accumulator.finish();
        assert_eq!(url, "/index.html?a=1");
        assert_eq!(headers.len(), 3);
        assert_eq!(headers.get(http::header::HOST), Some(&HeaderValue::from_static("example.com")));
        assert_eq!(headers.get(http::header::USER_AGENT), Some(&HeaderValue::from_static("curl/8.0")));
    }

    #[test]
    fn last_duplicate_wins() {
        let mut accumulator = HeaderAccumulator::new();
        accumulator.append([field("x-trace", "first")], None);
        accumulator.append([field("x-trace", "second")], None);

        let (headers, url) = accumulator.finish();
        assert!(url.is_empty());
        assert_eq!(headers.get_all("x-trace").iter().count(), 1);
        assert_eq!(headers.get("x-trace"), Some(&HeaderValue::from_static("second")));
    }
}
