//! Property tests for canary weight merging and ASAP annotation lookups

use ingress_policy::annotations::accessor::{build_native_key, build_nginx_key};
use ingress_policy::annotations::canary::{apply_by_weight, normalize_weight, normalize_weights, CanaryConfig};
use ingress_policy::annotations::{Annotations, Ingress, Meta};
use ingress_policy::mesh::{Destination, HttpMatchRequest, HttpRoute, HttpRouteDestination, StringMatch};
use proptest::prelude::*;

fn route(name: &str, host: &str) -> HttpRoute {
    HttpRoute {
        name: name.to_string(),
        r#match: vec![HttpMatchRequest { uri: Some(StringMatch::prefix("/")), ..Default::default() }],
        route: vec![HttpRouteDestination {
            destination: Destination::new(host, Some(80)),
            weight: 100,
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn canary_ingress(name: &str, weight: i32, weight_total: i32) -> Ingress {
    let mut ingress = Ingress::new(Meta { namespace: "default".into(), name: name.into(), ..Default::default() });
    ingress.canary = Some(CanaryConfig { enabled: true, weight, weight_total, ..Default::default() });
    ingress
}

proptest! {
    #[test]
    fn merged_weights_keep_order_and_sum(
        weights in prop::collection::vec(0i32..=30, 1..=3),
        total in prop::sample::select(vec![100i32, 200, 1000]),
    ) {
        let mut baseline = route("web", "stable");
        for (i, weight) in weights.iter().enumerate() {
            let name = format!("canary-{i}");
            let mut canary = route(&name, &name);
            apply_by_weight(&mut canary, &mut baseline, &canary_ingress(&name, *weight, total));
        }
        normalize_weights(&mut baseline, total);

        prop_assert_eq!(baseline.route.len(), weights.len() + 1);
        prop_assert_eq!(&baseline.route[0].destination.host, "stable");
        for (i, destination) in baseline.route[1..].iter().enumerate() {
            prop_assert_eq!(destination.destination.host.clone(), format!("canary-{i}"));
            prop_assert_eq!(destination.weight, normalize_weight(total, weights[i]));
            prop_assert_eq!(&destination.fallback_clusters[0].host, "stable");
        }
        let sum: i32 = baseline.route.iter().map(|d| d.weight).sum();
        prop_assert_eq!(sum, 100);
    }

    #[test]
    fn asap_prefers_valid_nginx_value(
        feature in "[a-z][a-z-]{0,15}",
        nginx in any::<bool>(),
        native in any::<bool>(),
    ) {
        let annotations: Annotations = [
            (build_nginx_key(&feature), nginx.to_string()),
            (build_native_key(&feature), native.to_string()),
        ]
        .into_iter()
        .collect();
        prop_assert_eq!(annotations.parse_bool_asap(&feature), Ok(nginx));
    }

    #[test]
    fn asap_falls_back_when_nginx_value_is_invalid(
        feature in "[a-z][a-z-]{0,15}",
        garbage in "[g-z]{2,8}",
        native in any::<bool>(),
    ) {
        let annotations: Annotations = [
            (build_nginx_key(&feature), garbage),
            (build_native_key(&feature), native.to_string()),
        ]
        .into_iter()
        .collect();
        prop_assert_eq!(annotations.parse_bool_asap(&feature), Ok(native));
    }

    #[test]
    fn asap_reports_invalid_nginx_value_when_native_is_absent(
        feature in "[a-z][a-z-]{0,15}",
        garbage in "[g-z]{2,8}",
    ) {
        let annotations: Annotations = [(build_nginx_key(&feature), garbage)].into_iter().collect();
        let err = annotations.parse_bool_asap(&feature).expect_err("invalid value");
        prop_assert!(!err.is_missing());
    }
}
