/// The three cache names owned by one worker version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
  /// App-wide cache named after the version alone
  pub umbrella: String,
  /// App shell, pages and assets
  pub static_assets: String,
  /// API response snapshots
  pub dynamic: String,
}

impl CacheNames {
  pub fn for_version(prefix: &str, version: &str) -> Self {
    Self {
      umbrella: format!("{}-{}", prefix, version),
      static_assets: format!("{}-static-{}", prefix, version),
      dynamic: format!("{}-dynamic-{}", prefix, version),
    }
  }

  /// Caches that survive activation of this version.
  pub fn allow_list(&self) -> [&str; 3] {
    [
      self.static_assets.as_str(),
      self.dynamic.as_str(),
      self.umbrella.as_str(),
    ]
  }

  pub fn contains(&self, name: &str) -> bool {
    self.allow_list().contains(&name)
  }
}
