use std::sync::OnceLock;

use cache::CloneCache;
use mongodb::Client as MongoClient;

use crate::{
  clients::{koji::KojiClient, mbs::MbsClient, pulp::PulpClient},
  config::odcs_config,
  store::Store,
};

static MONGO_CLIENT: OnceLock<MongoClient> = OnceLock::new();
static STORE: OnceLock<Store> = OnceLock::new();

/// Must be called once during startup, before `store()` is read anywhere.
pub async fn init_store() {
  let config = odcs_config();
  let client = match MongoClient::with_uri_str(&config.mongo_uri).await
  {
    Ok(client) => client,
    Err(e) => {
      tracing::error!(
        "FATAL: failed to connect to mongo at {} | {e:#} | Exiting...",
        config.mongo_uri
      );
      std::process::exit(1);
    }
  };
  MONGO_CLIENT.set(client).ok();
  let store = Store::new(
    MONGO_CLIENT.get().unwrap().database(&config.mongo_db_name),
  );
  if let Err(e) = store.ensure_indexes().await {
    tracing::error!(
      "FATAL: failed to ensure store indexes | {e:#} | Exiting..."
    );
    std::process::exit(1);
  }
  STORE.set(store).unwrap_or_else(|_| {
    panic!("store initialized more than once")
  });
}

pub fn store() -> &'static Store {
  STORE.get().unwrap_or_else(|| {
    tracing::error!(
      "FATAL: store accessed before initialized | Ensure init_store() is called during startup | Exiting..."
    );
    std::process::exit(1)
  })
}

/// `(tag, since_event)` -> whether Koji tag inheritance changed. Short-TTL
/// cache so a single ReuseIndex query checking many `koji_tag` candidates
/// against the same tag doesn't hit Koji once per candidate.
pub type KojiTagChangeCache = CloneCache<(String, i64), bool>;

pub fn koji_tag_change_cache() -> &'static KojiTagChangeCache {
  static CACHE: OnceLock<KojiTagChangeCache> = OnceLock::new();
  CACHE.get_or_init(Default::default)
}

/// Ids this process has already submitted to a worker pool and is still
/// tracking as `generating`. Used by the Scheduler's "refresh tracking"
/// step (spec §4.5.3) to know which ids to drop once the Store no longer
/// reports them as `generating`.
pub type GeneratingSet = CloneCache<i64, ()>;

pub fn generating_set() -> &'static GeneratingSet {
  static SET: OnceLock<GeneratingSet> = OnceLock::new();
  SET.get_or_init(Default::default)
}

/// Unset unless `ODCS_MBS_URL` is configured; only `module` composes need it.
pub fn mbs_client() -> Option<&'static MbsClient> {
  static CLIENT: OnceLock<Option<MbsClient>> = OnceLock::new();
  CLIENT
    .get_or_init(|| odcs_config().mbs_url.clone().map(MbsClient::new))
    .as_ref()
}

pub fn koji_client() -> Option<&'static KojiClient> {
  static CLIENT: OnceLock<Option<KojiClient>> = OnceLock::new();
  CLIENT
    .get_or_init(|| odcs_config().koji_url.clone().map(KojiClient::new))
    .as_ref()
}

pub fn pulp_client() -> Option<&'static PulpClient> {
  static CLIENT: OnceLock<Option<PulpClient>> = OnceLock::new();
  CLIENT
    .get_or_init(|| {
      let config = odcs_config();
      config.pulp_url.clone().map(|url| {
        PulpClient::new(
          url,
          config.pulp_username.clone(),
          config.pulp_password.clone(),
        )
      })
    })
    .as_ref()
}
