//! Fleet-wide local port allocation and `_URL` rewiring.
//!
//! Ports are handed out sequentially from [`BASE_PORT`] in fleet order. A
//! [`PortPlan`] can only be computed from a whole [`Fleet`], so every
//! service sees the same assignment for its siblings.

use std::collections::BTreeMap;

use stb_core::{Fleet, Service, ServiceName};

use crate::SyncError;

pub const BASE_PORT: u16 = 8000;
pub const SERVICE_PORT_FIELD: &str = "SERVICE_PORT";
const URL_SUFFIX: &str = "_URL";

/// Env field other services use to reach `name` (`my-svc` → `MY_SVC_URL`).
pub fn env_field_for(name: &ServiceName) -> String {
    format!("{}{URL_SUFFIX}", name.as_str().replace('-', "_").trim().to_uppercase())
}

/// Where each service of a fleet listens, and how siblings refer to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortPlan {
    ports: Vec<(ServiceName, u16)>,
    url_fields: BTreeMap<String, u16>,
}

impl PortPlan {
    /// Assign `BASE_PORT + index` to every service, in fleet order.
    pub fn for_fleet(fleet: &Fleet) -> Result<Self, SyncError> {
        let exhausted = || SyncError::PortRangeExhausted {
            base: BASE_PORT,
            count: fleet.len(),
        };

        let mut ports = Vec::with_capacity(fleet.len());
        let mut url_fields = BTreeMap::new();
        for (index, service) in fleet.iter().enumerate() {
            let offset = u16::try_from(index).map_err(|_| exhausted())?;
            let port = BASE_PORT.checked_add(offset).ok_or_else(exhausted)?;
            let name = service.name();
            url_fields.insert(env_field_for(&name), port);
            ports.push((name, port));
        }
        Ok(Self { ports, url_fields })
    }

    pub fn port_of(&self, name: &ServiceName) -> Option<u16> {
        self.ports
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, port)| *port)
    }

    /// `(service, port)` pairs in fleet order.
    pub fn ports(&self) -> &[(ServiceName, u16)] {
        &self.ports
    }

    /// Set `SERVICE_PORT` and rewrite the `_URL` fields of one service.
    ///
    /// A service outside the plan only gets its `_URL` fields rewired.
    pub fn apply(&self, service: &mut Service) {
        let name = service.name();
        match self.port_of(&name) {
            Some(port) => {
                service.dotenv.insert(SERVICE_PORT_FIELD, port.to_string());
            }
            None => tracing::warn!("{name} is not part of the port plan"),
        }

        let url_fields: Vec<String> = service
            .dotenv
            .keys()
            .into_iter()
            .filter(|field| field.ends_with(URL_SUFFIX))
            .map(str::to_string)
            .collect();

        for field in url_fields {
            let value = match self.url_fields.get(&field) {
                Some(port) => format!("http://localhost:{port}"),
                None => match service
                    .yaml_config
                    .as_ref()
                    .and_then(|manifest| manifest.review_default(&field))
                {
                    Some(default) => default.to_string(),
                    None => continue,
                },
            };
            service.dotenv.insert(field, value);
        }
    }
}

/// Build the plan for `fleet` and apply it to every member.
pub fn allocate_and_rewire(fleet: &mut Fleet) -> Result<PortPlan, SyncError> {
    let plan = PortPlan::for_fleet(fleet)?;
    for service in fleet.iter_mut() {
        plan.apply(service);
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stb_core::{manifest::REVIEW_STAGE, DotEnv, Manifest};

    fn service(name: &str, env: &str) -> Service {
        let mut service = Service::new(format!("/code/{name}"));
        service.dotenv = DotEnv::parse(env);
        service
    }

    fn fleet(services: Vec<Service>) -> Fleet {
        Fleet::new(services).unwrap()
    }

    #[test]
    fn field_name_is_upper_snake_with_url_suffix() {
        assert_eq!(env_field_for(&"my-svc".into()), "MY_SVC_URL");
        assert_eq!(env_field_for(&"billing".into()), "BILLING_URL");
    }

    #[test]
    fn ports_follow_fleet_order() {
        let mut fleet = fleet(vec![service("zeta", ""), service("alpha", ""), service("mid", "")]);
        let plan = allocate_and_rewire(&mut fleet).unwrap();

        let ports: Vec<u16> = plan.ports().iter().map(|(_, p)| *p).collect();
        assert_eq!(ports, vec![8000, 8001, 8002]);
        assert_eq!(plan.port_of(&"zeta".into()), Some(8000));
        let service_ports: Vec<&str> = fleet
            .iter()
            .map(|s| s.dotenv.get(SERVICE_PORT_FIELD).unwrap())
            .collect();
        assert_eq!(service_ports, vec!["8000", "8001", "8002"]);
    }

    #[test]
    fn rerun_is_idempotent() {
        let mut fleet = fleet(vec![service("a", ""), service("b", "A_URL=x\n")]);
        allocate_and_rewire(&mut fleet).unwrap();
        let first: Vec<String> = fleet.iter().map(|s| s.dotenv.render()).collect();
        allocate_and_rewire(&mut fleet).unwrap();
        let second: Vec<String> = fleet.iter().map(|s| s.dotenv.render()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn sibling_url_points_at_sibling_port() {
        let mut fleet = fleet(vec![service("a", ""), service("b", "A_URL=https://a.example\n")]);
        allocate_and_rewire(&mut fleet).unwrap();
        let b = fleet.get(&"b".into()).unwrap();
        assert_eq!(b.dotenv.get("A_URL"), Some("http://localhost:8000"));
        assert_eq!(b.dotenv.get(SERVICE_PORT_FIELD), Some("8001"));
    }

    #[test]
    fn unknown_url_falls_back_to_review_default() {
        let mut b = service("b", "PAYMENTS_URL=\n");
        b.yaml_config = Some(
            [("payments_url", REVIEW_STAGE, "https://payments.review")]
                .into_iter()
                .collect::<Manifest>(),
        );
        let mut fleet = fleet(vec![b]);
        allocate_and_rewire(&mut fleet).unwrap();
        assert_eq!(
            fleet.get(&"b".into()).unwrap().dotenv.get("PAYMENTS_URL"),
            Some("https://payments.review")
        );
    }

    #[test]
    fn unmatched_url_is_left_byte_for_byte() {
        let original = "# deps\nEXTERNAL_URL='https://x.example'  # keep\n";
        let mut fleet = fleet(vec![service("solo", original)]);
        allocate_and_rewire(&mut fleet).unwrap();
        let solo = fleet.get(&"solo".into()).unwrap();
        assert_eq!(
            solo.dotenv.render(),
            format!("{original}{SERVICE_PORT_FIELD}=8000\n")
        );
    }

    #[test]
    fn sibling_wins_over_manifest_default() {
        let mut b = service("b", "A_URL=\n");
        b.yaml_config = Some(
            [("a_url", REVIEW_STAGE, "https://a.review")]
                .into_iter()
                .collect::<Manifest>(),
        );
        let mut fleet = fleet(vec![service("a", ""), b]);
        allocate_and_rewire(&mut fleet).unwrap();
        assert_eq!(
            fleet.get(&"b".into()).unwrap().dotenv.get("A_URL"),
            Some("http://localhost:8000")
        );
    }

    #[test]
    fn empty_fleet_yields_empty_plan() {
        let mut fleet = fleet(Vec::new());
        let plan = allocate_and_rewire(&mut fleet).unwrap();
        assert!(plan.ports().is_empty());
    }
}
