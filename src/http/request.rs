use std::collections::BTreeMap;

/// Description of an outgoing HTTP request, independent of any client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub basic_auth: Option<BasicAuth>,
}

/// Credentials for the `Basic` authorization scheme
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("user", &self.user)
            .field("password", &"****")
            .finish()
    }
}

impl BasicAuth {
    /// Both halves are set
    pub fn is_complete(&self) -> bool {
        !self.user.is_empty() && !self.password.is_empty()
    }

    /// Value of the `Authorization` header
    pub fn header_value(&self) -> String {
        format!(
            "Basic {}",
            base64::encode(format!("{}:{}", self.user, self.password))
        )
    }
}

impl Request {
    pub fn new<M: Into<String>, U: Into<String>>(method: M, url: U) -> Request {
        Request {
            method: method.into(),
            url: url.into(),
            headers: BTreeMap::new(),
            basic_auth: None,
        }
    }

    pub fn post<U: Into<String>>(url: U) -> Request {
        Request::new("POST", url)
    }

    /// Sets a header, replacing any previous value for the same name
    pub fn add_header<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        self.headers.insert(name.into(), value.into());
    }

    /// Credentials are only sent when both are non-empty
    pub fn set_basic_auth<U: Into<String>, P: Into<String>>(&mut self, user: U, password: P) {
        self.basic_auth = Some(BasicAuth {
            user: user.into(),
            password: password.into(),
        });
    }
}
