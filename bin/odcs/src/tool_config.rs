//! Renders the three files the external compose tool reads from its working
//! directory (spec §4.7): the main configuration, `variants.xml`, and
//! `comps.xml`. Templates are rendered with `minijinja`, mirroring how the
//! original Pungi integration rendered its `pungi.conf`/`variants.xml`
//! templates with Jinja2 (`examples/original_source/server/odcs/server/pungi.py`).

use minijinja::{Environment, context};
use odcs_client::entities::compose::{Compose, ComposeFlag, ComposeResult, SourceType};

use crate::error::OdcsError;

/// `config=self` rendering target in the original: release identifiers,
/// sigkeys (request order preserved, SPEC_FULL §C.9), pkgset source,
/// gather source/method, inheritance flag, arches, skip-phase list,
/// multilib policy, check_deps.
const MAIN_CONFIG_TEMPLATE: &str = r#"
release_name = "{{ release_name }}"
release_short = "{{ release_short }}"
release_version = "{{ release_version }}"
release_is_layered = False

variants_file = "variants.xml"
{% if comps_file %}comps_file = "{{ comps_file }}"{% endif %}

sigkeys = [{% for key in sigkeys %}"{{ key }}"{% if not loop.last %}, {% endif %}{% endfor %}]

pkgset_source = "{{ pkgset_source }}"
{% if koji_tag %}pkgset_koji_tag = "{{ koji_tag }}"{% endif %}
pkgset_koji_inherit = {{ inherit }}

gather_source = "{{ gather_source }}"
gather_method = "{{ gather_method }}"
{% if check_deps %}check_deps = True{% else %}check_deps = False{% endif %}

{% if multilib_arches %}
multilib_arches = [{% for arch in multilib_arches %}"{{ arch }}"{% if not loop.last %}, {% endif %}{% endfor %}]
multilib_method = "{{ multilib_method }}"
{% endif %}

skip_phases = [{% for phase in skip_phases %}"{{ phase }}"{% if not loop.last %}, {% endif %}{% endfor %}]

{% if lookaside_repos %}
lookaside_repos = [{% for repo in lookaside_repos %}"{{ repo }}"{% if not loop.last %}, {% endif %}{% endfor %}]
{% endif %}
"#;

const VARIANTS_TEMPLATE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<productmd>
  <product short="{{ release_short }}" name="{{ release_name }}" version="{{ release_version }}"/>
  <variants>
    <variant id="Temporary" name="Temporary" type="variant">
      <arches>
        {% for arch in arches %}<arch>{{ arch }}</arch>
        {% endfor %}
      </arches>
      {% if modules %}
      <modules>
        {% for module in modules %}<module>{{ module }}</module>
        {% endfor %}
      </modules>
      {% endif %}
      {% if groups %}
      <groups>
        {% for group in groups %}<group>{{ group }}</group>
        {% endfor %}
      </groups>
      {% endif %}
    </variant>
  </variants>
</productmd>
"#;

const COMPS_TEMPLATE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<comps>
  <group>
    <id>odcs-group</id>
    <name>odcs-group</name>
    <description>ODCS compose default group</description>
    <default>true</default>
    <uservisible>true</uservisible>
    <packagelist>
      {% for package in packages %}<packagereq type="mandatory">{{ package }}</packagereq>
      {% endfor %}
    </packagelist>
  </group>
</comps>
"#;

/// Rendered configuration ready to be written into the tool's working
/// directory: `main.conf`, `variants.xml`, and `comps.xml` (the latter
/// omitted for `module` source type per spec §4.7).
pub struct RenderedToolConfig {
  pub main_config: String,
  pub variants_xml: String,
  pub comps_xml: Option<String>,
}

/// The release/package-set shape a `Compose` maps onto when rendering the
/// tool config. Deliberately mirrors `PungiConfig.__init__`'s derivation
/// of `gather_source`/`gather_method`/`pkgset_source` from `source_type`.
pub fn render(
  compose: &Compose,
  release_name: &str,
  release_version: &str,
  lookaside_repos: &[String],
) -> Result<RenderedToolConfig, OdcsError> {
  let release_short: String = release_name.chars().take(16).collect();

  let has_modules = compose.source_type == SourceType::Module;
  let modular_koji_tag = compose.source_type == SourceType::KojiTag
    && compose.source.iter().any(|s| s.starts_with("module:"));

  let (pkgset_source, gather_source, gather_method, koji_tag) =
    match compose.source_type {
      SourceType::KojiTag if modular_koji_tag => {
        ("koji", "comps", "hybrid", Some(compose.source.join(" ")))
      }
      SourceType::KojiTag => {
        ("koji", "comps", "deps", Some(compose.source.join(" ")))
      }
      SourceType::Module => ("koji", "module", "nodeps", None),
      SourceType::Repo => ("repos", "comps", "deps", None),
      SourceType::Build => ("koji", "comps", "deps", None),
      SourceType::RawConfig | SourceType::Pulp => {
        return Err(OdcsError::Fatal(format!(
          "{:?} composes do not render a tool config",
          compose.source_type
        )));
      }
    };

  let mut skip_phases = Vec::new();
  if !compose.has_result(ComposeResult::Iso) {
    skip_phases.push("createiso".to_string());
  }
  if !compose.has_result(ComposeResult::BootIso) {
    skip_phases.push("buildinstall".to_string());
  }

  let env = Environment::new();

  let main_config = env
    .render_str(
      MAIN_CONFIG_TEMPLATE,
      context! {
        release_name => release_name,
        release_short => release_short,
        release_version => release_version,
        comps_file => if has_modules { None } else { Some("comps.xml") },
        sigkeys => &compose.sigkeys,
        pkgset_source => pkgset_source,
        koji_tag => koji_tag,
        inherit => !compose.has_flag(ComposeFlag::NoInheritance),
        gather_source => gather_source,
        gather_method => gather_method,
        check_deps => compose.has_flag(ComposeFlag::CheckDeps),
        multilib_arches => &compose.multilib_arches,
        multilib_method => &compose.multilib_method,
        skip_phases => skip_phases,
        lookaside_repos => lookaside_repos,
      },
    )
    .map_err(|e| {
      OdcsError::Fatal(format!("failed to render main tool config: {e}"))
    })?;

  let variants_xml = env
    .render_str(
      VARIANTS_TEMPLATE,
      context! {
        release_name => release_name,
        release_short => release_short,
        release_version => release_version,
        arches => &compose.arches,
        modules => if has_modules { Some(&compose.source) } else { None },
        groups => if !has_modules && compose.packages.is_some() {
          Some(vec!["odcs-group".to_string()])
        } else {
          None
        },
      },
    )
    .map_err(|e| {
      OdcsError::Fatal(format!("failed to render variants.xml: {e}"))
    })?;

  let comps_xml = if has_modules {
    None
  } else {
    Some(
      env
        .render_str(
          COMPS_TEMPLATE,
          context! { packages => compose.packages.clone().unwrap_or_default() },
        )
        .map_err(|e| {
          OdcsError::Fatal(format!("failed to render comps.xml: {e}"))
        })?,
    )
  };

  Ok(RenderedToolConfig { main_config, variants_xml, comps_xml })
}

#[cfg(test)]
mod tests {
  use odcs_client::entities::compose::ComposeState;

  use super::*;

  fn base_compose(source_type: SourceType) -> Compose {
    Compose {
      id: Some(1),
      owner: "tester".to_string(),
      source_type,
      source: vec!["f26".to_string()],
      packages: Some(vec!["ed".to_string()]),
      builds: None,
      sigkeys: vec!["123".to_string(), "456".to_string()],
      arches: vec!["x86_64".to_string()],
      multilib_arches: None,
      multilib_method: None,
      flags: vec![],
      results: vec![ComposeResult::Repository],
      koji_event: None,
      state: ComposeState::Generating,
      state_reason: String::new(),
      time_submitted: 0,
      time_done: None,
      time_removed: None,
      time_to_expire: 0,
      removed_by: None,
      reused_id: None,
      koji_task_id: None,
      pungi_compose_id: None,
    }
  }

  #[test]
  fn koji_tag_config_has_comps_gather_source() {
    let compose = base_compose(SourceType::KojiTag);
    let rendered =
      render(&compose, "MBS-512", "1", &[]).unwrap();
    assert!(rendered.main_config.contains(r#"gather_source = "comps""#));
    assert!(rendered.main_config.contains(r#"sigkeys = ["123", "456"]"#));
    assert!(rendered.comps_xml.unwrap().contains("ed</packagereq>"));
  }

  #[test]
  fn module_config_skips_comps_file() {
    let mut compose = base_compose(SourceType::Module);
    compose.source = vec!["testmodule:master:1:1".to_string()];
    compose.packages = None;
    let rendered =
      render(&compose, "MBS-512", "1", &[]).unwrap();
    assert!(rendered.main_config.contains(r#"gather_source = "module""#));
    assert!(rendered.comps_xml.is_none());
    assert!(rendered.variants_xml.contains("<module>"));
  }

  #[test]
  fn skip_phases_include_createiso_and_buildinstall_by_default() {
    let compose = base_compose(SourceType::KojiTag);
    let rendered =
      render(&compose, "MBS-512", "1", &[]).unwrap();
    assert!(rendered.main_config.contains("createiso"));
    assert!(rendered.main_config.contains("buildinstall"));
  }

  #[test]
  fn iso_result_drops_createiso_from_skip_phases() {
    let mut compose = base_compose(SourceType::KojiTag);
    compose.results = vec![ComposeResult::Repository, ComposeResult::Iso];
    let rendered =
      render(&compose, "MBS-512", "1", &[]).unwrap();
    assert!(!rendered.main_config.contains("\"createiso\""));
    assert!(rendered.main_config.contains("buildinstall"));
  }
}
