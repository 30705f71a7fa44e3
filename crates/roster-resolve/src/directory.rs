//! The employee directory and the registry of employee logins built from it.

use std::{
  collections::BTreeSet,
  future::Future,
  sync::{Arc, RwLock},
  time::Duration,
};

use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{Error, Result, cache::ResponseCache, config::DirectoryConfig};

/// Cache key of the login set.
const EMPLOYEE_LOGINS_KEY: &str = "lark-contact-github-logins";
const ROOT_DEPARTMENT: &str = "0";
const PAGE_SIZE: &str = "50";

/// One page of a paginated listing.
#[derive(Debug, Clone, Default)]
pub struct Page<T> {
  pub items:      Vec<T>,
  pub has_more:   bool,
  pub page_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttrValue {
  #[serde(default)]
  pub text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomAttr {
  pub id:    String,
  #[serde(default)]
  pub value: AttrValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryUser {
  #[serde(default)]
  pub custom_attrs: Vec<CustomAttr>,
}

/// A paginated employee directory.
pub trait Directory: Send + Sync {
  /// Every department below the root, recursively.
  fn departments(
    &self,
    page_token: Option<String>,
  ) -> impl Future<Output = Result<Page<String>>> + Send + '_;

  /// Members of one department.
  fn users(
    &self,
    department: String,
    page_token: Option<String>,
  ) -> impl Future<Output = Result<Page<DirectoryUser>>> + Send + '_;
}

// ─── Lark implementation ─────────────────────────────────────────────────────

#[derive(Serialize)]
struct AppCredentials<'a> {
  app_id:     &'a str,
  app_secret: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
  code:                i64,
  #[serde(default)]
  msg:                 String,
  #[serde(default)]
  tenant_access_token: String,
}

#[derive(Deserialize)]
struct Envelope<D> {
  code: i64,
  #[serde(default)]
  msg:  String,
  data: Option<D>,
}

#[derive(Deserialize)]
struct PageData<T> {
  #[serde(default)]
  has_more:   bool,
  #[serde(default)]
  page_token: Option<String>,
  #[serde(default = "Vec::new")]
  items:      Vec<T>,
}

#[derive(Deserialize)]
struct Department {
  open_department_id: String,
}

/// The Lark (Feishu) contact API, authenticated with a tenant access token.
#[derive(Clone)]
pub struct LarkDirectory {
  client:   Client,
  base_url: String,
  token:    String,
}

impl LarkDirectory {
  /// Obtain a tenant access token and return a ready directory.
  pub async fn connect(config: &DirectoryConfig) -> Result<Self> {
    let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
    let base_url = config.base_url.trim_end_matches('/').to_owned();

    let endpoint = "auth/v3/tenant_access_token/internal/";
    let resp: TokenResponse = client
      .post(format!("{base_url}/{endpoint}"))
      .json(&AppCredentials {
        app_id:     &config.app_id,
        app_secret: &config.app_secret,
      })
      .send()
      .await?
      .json()
      .await?;
    if resp.code != 0 {
      return Err(Error::Api { endpoint: endpoint.into(), message: resp.msg });
    }

    Ok(Self { client, base_url, token: resp.tenant_access_token })
  }

  async fn get_page<T: DeserializeOwned>(
    &self,
    endpoint: &str,
    query: &[(&str, &str)],
    page_token: Option<String>,
  ) -> Result<PageData<T>> {
    let mut req = self
      .client
      .get(format!("{}/{endpoint}", self.base_url))
      .bearer_auth(&self.token)
      .query(query)
      .query(&[("page_size", PAGE_SIZE)]);
    if let Some(token) = page_token.as_deref() {
      req = req.query(&[("page_token", token)]);
    }

    let resp = req.send().await?;
    if !resp.status().is_success() {
      return Err(Error::Status {
        endpoint: endpoint.to_owned(),
        status:   resp.status().as_u16(),
      });
    }
    let body: Envelope<PageData<T>> = resp.json().await?;
    if body.code != 0 {
      return Err(Error::Api { endpoint: endpoint.to_owned(), message: body.msg });
    }
    body.data.ok_or_else(|| Error::Api {
      endpoint: endpoint.to_owned(),
      message:  "response has no data".into(),
    })
  }
}

impl Directory for LarkDirectory {
  async fn departments(&self, page_token: Option<String>) -> Result<Page<String>> {
    let endpoint = format!("contact/v3/departments/{ROOT_DEPARTMENT}/children");
    let data: PageData<Department> = self
      .get_page(&endpoint, &[("fetch_child", "true")], page_token)
      .await?;
    Ok(Page {
      items:      data.items.into_iter().map(|d| d.open_department_id).collect(),
      has_more:   data.has_more,
      page_token: data.page_token,
    })
  }

  async fn users(
    &self,
    department: String,
    page_token: Option<String>,
  ) -> Result<Page<DirectoryUser>> {
    let data: PageData<DirectoryUser> = self
      .get_page(
        "contact/v3/users",
        &[("department_id", department.as_str())],
        page_token,
      )
      .await?;
    Ok(Page { items: data.items, has_more: data.has_more, page_token: data.page_token })
  }
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// The set of GitHub logins that belong to current employees.
pub struct EmployeeRegistry<D> {
  directory:     Option<D>,
  login_attr_id: String,
  cache:         Arc<ResponseCache>,
  ttl:           Duration,
  logins:        RwLock<BTreeSet<String>>,
}

impl<D: Directory> EmployeeRegistry<D> {
  /// A registry without a directory never reports an employee.
  pub fn new(
    directory: Option<D>,
    login_attr_id: impl Into<String>,
    cache: Arc<ResponseCache>,
    ttl: Duration,
  ) -> Self {
    Self {
      directory,
      login_attr_id: login_attr_id.into(),
      cache,
      ttl,
      logins: RwLock::new(BTreeSet::new()),
    }
  }

  /// Load the login set, from the cache when possible.
  pub async fn refresh(&self) -> Result<()> {
    let Some(directory) = &self.directory else {
      return Ok(());
    };

    if let Some(logins) = self.cache.employee_logins.get(EMPLOYEE_LOGINS_KEY) {
      tracing::debug!(logins = logins.len(), "employee logins served from cache");
      self.replace(logins);
      return Ok(());
    }

    let mut departments = Vec::new();
    let mut token = None;
    loop {
      let page = directory.departments(token.take()).await?;
      departments.extend(page.items);
      match next_page("departments", page.has_more, page.page_token)? {
        Some(next) => token = Some(next),
        None => break,
      }
    }

    let mut logins = BTreeSet::new();
    for department in departments {
      tracing::info!(%department, "fetching employee logins");
      let mut token = None;
      loop {
        let page = directory.users(department.clone(), token.take()).await?;
        for user in page.items {
          logins.extend(
            user
              .custom_attrs
              .into_iter()
              .filter(|a| a.id == self.login_attr_id)
              .map(|a| a.value.text),
          );
        }
        match next_page("users", page.has_more, page.page_token)? {
          Some(next) => token = Some(next),
          None => break,
        }
      }
    }

    tracing::info!(logins = logins.len(), "loaded employee logins from directory");
    self.cache.employee_logins.insert(EMPLOYEE_LOGINS_KEY, logins.clone(), self.ttl);
    self.replace(logins);
    Ok(())
  }

  pub fn is_employee(&self, login: &str) -> bool {
    self
      .logins
      .read()
      .map(|set| set.contains(login))
      .unwrap_or(false)
  }

  fn replace(&self, logins: BTreeSet<String>) {
    match self.logins.write() {
      Ok(mut held) => *held = logins,
      Err(poisoned) => *poisoned.into_inner() = logins,
    }
  }
}

/// The token for the following page, or `None` after the last one. A page
/// that claims more results without a token would restart the listing.
fn next_page(endpoint: &str, has_more: bool, token: Option<String>) -> Result<Option<String>> {
  match (has_more, token) {
    (false, _) => Ok(None),
    (true, Some(token)) => Ok(Some(token)),
    (true, None) => Err(Error::Api {
      endpoint: endpoint.to_owned(),
      message:  "has_more without a page_token".into(),
    }),
  }
}
