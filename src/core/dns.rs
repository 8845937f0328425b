//! DNS reconciliation: idempotent CNAME upsert against the edge provider.

use crate::error::{Error, Result};
use crate::profile::Profile;
use crate::providers::{DnsRecordSpec, EdgeApi};
use crate::settings::EdgeSettings;

pub const DNS_TTL: u32 = 60;
pub const CNAME: &str = "CNAME";

/// Reconcile the app hostname to point at the ingress target.
///
/// No-op without a configured zone. Repeated calls with unchanged inputs
/// perform zero writes after the first: an existing record that already
/// matches content and proxy flag is left alone.
pub fn ensure_hostname(
    edge: &dyn EdgeApi,
    token: &str,
    settings: &EdgeSettings,
    profile: &Profile,
    app_name: &str,
    ingress_target: &str,
) -> Result<Option<String>> {
    let Some(zone) = profile.zone.clone().or_else(|| settings.zone.clone()) else {
        return Ok(None);
    };

    let hostname = profile
        .hostname
        .clone()
        .or_else(|| settings.hostname.clone())
        .unwrap_or_else(|| format!("{}.{}", app_name, zone));

    let zone_id = match settings.zone_id.clone().filter(|_| settings.zone.as_deref() == Some(zone.as_str())) {
        Some(id) => id,
        None => edge
            .find_zone(token, &zone)?
            .ok_or_else(|| Error::dns_zone_not_found(zone.clone()))?
            .id,
    };

    let desired = DnsRecordSpec {
        name: hostname.clone(),
        record_type: CNAME.to_string(),
        content: ingress_target.to_string(),
        proxied: true,
        ttl: DNS_TTL,
    };

    let existing = edge
        .list_dns_records(token, &zone_id, &hostname)?
        .into_iter()
        .find(|record| record.record_type == CNAME);

    match existing {
        Some(record) if record.content == desired.content && record.proxied == desired.proxied => {
            // Already converged.
        }
        Some(record) => {
            edge.update_dns_record(token, &zone_id, &record.id, &desired)
                .map_err(|e| Error::dns_record_failed(hostname.clone(), e.message))?;
            crate::log_status!("dns", "Updated {} -> {}", hostname, ingress_target);
        }
        None => {
            edge.create_dns_record(token, &zone_id, &desired)
                .map_err(|e| Error::dns_record_failed(hostname.clone(), e.message))?;
            crate::log_status!("dns", "Created {} -> {}", hostname, ingress_target);
        }
    }

    Ok(Some(hostname))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::fakes::FakeEdge;

    fn settings(zone: &str, zone_id: &str) -> EdgeSettings {
        EdgeSettings {
            zone: Some(zone.to_string()),
            zone_id: Some(zone_id.to_string()),
            ..Default::default()
        }
    }

    fn profile() -> Profile {
        Profile {
            app: "demo-app".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn no_zone_configured_is_a_noop() {
        let edge = FakeEdge::new().with_token("et");
        let result = ensure_hostname(
            &edge,
            "et",
            &EdgeSettings::default(),
            &profile(),
            "demo-app",
            "demo-app.strato.app",
        )
        .unwrap();
        assert_eq!(result, None);
        assert_eq!(edge.dns_writes(), 0);
    }

    #[test]
    fn creates_then_converges_with_zero_further_writes() {
        let edge = FakeEdge::new().with_token("et").with_zone("z1", "example.com");
        let settings = settings("example.com", "z1");

        let hostname = ensure_hostname(
            &edge,
            "et",
            &settings,
            &profile(),
            "demo-app",
            "demo-app.strato.app",
        )
        .unwrap();
        assert_eq!(hostname.as_deref(), Some("demo-app.example.com"));
        assert_eq!(edge.dns_writes(), 1);

        let records = edge.records_in_zone("z1");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, "demo-app.strato.app");
        assert!(records[0].proxied);
        assert_eq!(records[0].ttl, DNS_TTL);

        // Unchanged inputs: zero additional writes, any number of calls.
        for _ in 0..3 {
            ensure_hostname(
                &edge,
                "et",
                &settings,
                &profile(),
                "demo-app",
                "demo-app.strato.app",
            )
            .unwrap();
        }
        assert_eq!(edge.dns_writes(), 1);
    }

    #[test]
    fn drifted_record_is_updated_in_place() {
        let edge = FakeEdge::new().with_token("et").with_zone("z1", "example.com");
        let settings = settings("example.com", "z1");

        ensure_hostname(&edge, "et", &settings, &profile(), "demo-app", "old.target").unwrap();
        ensure_hostname(&edge, "et", &settings, &profile(), "demo-app", "new.target").unwrap();

        let records = edge.records_in_zone("z1");
        assert_eq!(records.len(), 1, "update must not duplicate the record");
        assert_eq!(records[0].content, "new.target");
        assert_eq!(edge.dns_writes(), 2);
    }

    #[test]
    fn explicit_hostname_override_wins() {
        let edge = FakeEdge::new().with_token("et").with_zone("z1", "example.com");
        let mut profile = profile();
        profile.hostname = Some("www.example.com".to_string());

        let hostname = ensure_hostname(
            &edge,
            "et",
            &settings("example.com", "z1"),
            &profile,
            "demo-app",
            "demo-app.strato.app",
        )
        .unwrap();
        assert_eq!(hostname.as_deref(), Some("www.example.com"));
    }

    #[test]
    fn zone_id_is_resolved_by_name_when_not_cached() {
        let edge = FakeEdge::new().with_token("et").with_zone("z9", "example.org");
        let settings = EdgeSettings {
            zone: Some("example.org".to_string()),
            ..Default::default()
        };
        let hostname =
            ensure_hostname(&edge, "et", &settings, &profile(), "demo-app", "t").unwrap();
        assert_eq!(hostname.as_deref(), Some("demo-app.example.org"));
        assert_eq!(edge.records_in_zone("z9").len(), 1);
    }

    #[test]
    fn unknown_zone_is_an_error() {
        let edge = FakeEdge::new().with_token("et");
        let settings = EdgeSettings {
            zone: Some("missing.example".to_string()),
            ..Default::default()
        };
        let err = ensure_hostname(&edge, "et", &settings, &profile(), "demo-app", "t").unwrap_err();
        assert_eq!(err.code.as_str(), "dns.zone_not_found");
    }
}
