use std::fmt;

/// The path and query of a request target.
///
/// Only the parts needed for local routing are kept: scheme, authority and
/// fragment are not recognised, and no percent-decoding is done. Both parts
/// are lower-cased so that routing is case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uri {
    path: String,
    query: String,
}

impl Uri {
    /// Parses a raw request target.
    ///
    /// Never fails: everything before the first `?` is the path, everything
    /// after it the query, and the path is made absolute by prepending `/`
    /// when it is missing.
    ///
    /// ```
    /// # use ferrule::Uri;
    /// let uri = Uri::parse("/Foo?Bar");
    /// assert_eq!(uri.path(), "/foo");
    /// assert_eq!(uri.query(), "bar");
    /// ```
    pub fn parse(raw: &str) -> Uri {
        let raw = raw.to_ascii_lowercase();

        let (path, query) = match raw.split_once('?') {
            Some((path, query)) => (path, query),
            None => (raw.as_str(), ""),
        };

        let path = if path.starts_with('/') {
            path.to_owned()
        } else {
            format!("/{}", path)
        };

        Uri {
            path,
            query: query.to_owned(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn is_valid(&self) -> bool {
        !self.path.is_empty()
    }
}

impl Default for Uri {
    fn default() -> Self {
        Uri::parse("")
    }
}

impl From<&str> for Uri {
    fn from(raw: &str) -> Self {
        Uri::parse(raw)
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)?;
        if !self.query.is_empty() {
            write!(f, "?{}", self.query)?;
        }
        Ok(())
    }
}
