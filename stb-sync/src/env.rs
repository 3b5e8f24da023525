//! Additive merge of template defaults into a service's `.env`.
//!
//! Existing values always win: a key already present in `.env` is never
//! touched, whatever the template or the overrides say. Missing keys get,
//! in order of preference, the template's non-empty default, the override
//! variable of the same name, or the empty string.

use stb_core::{EnvOverrides, Fleet, Service};

/// Add every template key missing from `service.dotenv`.
///
/// Only the in-memory mapping changes; persisting is the caller's job.
/// Returns the keys that were added, in template order.
pub fn reconcile(service: &mut Service, overrides: &EnvOverrides) -> Vec<String> {
    let mut added = Vec::new();
    for (field, example_value) in service.dotenv_example.iter() {
        if service.dotenv.contains_key(field) {
            continue;
        }
        let value = if example_value.is_empty() {
            overrides.get(field).unwrap_or_default()
        } else {
            example_value
        };
        added.push((field.to_string(), value.to_string()));
    }

    for (field, value) in &added {
        service.dotenv.insert(field.as_str(), value.as_str());
    }
    if !added.is_empty() {
        tracing::debug!("{}: added {} field(s) from template", service.name(), added.len());
    }
    added.into_iter().map(|(field, _)| field).collect()
}

/// [`reconcile`] every service of the fleet.
pub fn reconcile_fleet(fleet: &mut Fleet, overrides: &EnvOverrides) {
    for service in fleet.iter_mut() {
        reconcile(service, overrides);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stb_core::DotEnv;

    fn service(env: &str, example: &str) -> Service {
        let mut service = Service::new("/code/billing");
        service.dotenv = DotEnv::parse(env);
        service.dotenv_example = DotEnv::parse(example);
        service
    }

    #[test]
    fn existing_values_always_win() {
        let mut svc = service("A=mine\nB=\n", "A=template\nB=template\n");
        let overrides: EnvOverrides = [("A", "override"), ("B", "override")].into_iter().collect();
        let added = reconcile(&mut svc, &overrides);
        assert!(added.is_empty());
        assert_eq!(svc.dotenv.get("A"), Some("mine"));
        assert_eq!(svc.dotenv.get("B"), Some(""));
    }

    #[test]
    fn template_default_beats_override() {
        let mut svc = service("", "A=template\n");
        let overrides: EnvOverrides = [("A", "override")].into_iter().collect();
        reconcile(&mut svc, &overrides);
        assert_eq!(svc.dotenv.get("A"), Some("template"));
    }

    #[test]
    fn empty_template_falls_back_to_override() {
        let mut svc = service("", "SENTRY_DSN=\n");
        let overrides: EnvOverrides = [("SENTRY_DSN", "https://sentry.local")].into_iter().collect();
        reconcile(&mut svc, &overrides);
        assert_eq!(svc.dotenv.get("SENTRY_DSN"), Some("https://sentry.local"));
    }

    #[test]
    fn empty_template_without_override_is_empty_string() {
        let mut svc = service("", "SECRET=\n");
        let added = reconcile(&mut svc, &EnvOverrides::default());
        assert_eq!(added, vec!["SECRET".to_string()]);
        assert_eq!(svc.dotenv.get("SECRET"), Some(""));
    }

    #[test]
    fn result_is_superset_of_template_and_preserves_existing() {
        let mut svc = service("# local\nX=1\nA=keep\n", "A=\nB=2\nC=\n");
        let before: Vec<(String, String)> = svc
            .dotenv
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        reconcile(&mut svc, &EnvOverrides::default());

        for key in svc.dotenv_example.keys() {
            assert!(svc.dotenv.contains_key(key), "{key} missing after reconcile");
        }
        for (key, value) in before {
            assert_eq!(svc.dotenv.get(&key), Some(value.as_str()));
        }
        assert_eq!(svc.dotenv.render(), "# local\nX=1\nA=keep\nB=2\nC=\n");
    }

    #[test]
    fn reconcile_fleet_touches_every_service() {
        let mut fleet = Fleet::new(vec![
            {
                let mut s = Service::new("/code/a");
                s.dotenv_example = DotEnv::parse("A=1\n");
                s
            },
            {
                let mut s = Service::new("/code/b");
                s.dotenv_example = DotEnv::parse("B=2\n");
                s
            },
        ])
        .unwrap();
        reconcile_fleet(&mut fleet, &EnvOverrides::default());
        let values: Vec<Option<String>> = fleet
            .iter()
            .map(|s| s.dotenv.iter().next().map(|(_, v)| v.to_string()))
            .collect();
        assert_eq!(values, vec![Some("1".to_string()), Some("2".to_string())]);
    }
}
