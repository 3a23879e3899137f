// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Property tests for domain routing

use fairscore_core::{Domain, DomainRouter, FairConfig};
use proptest::prelude::*;

fn router() -> DomainRouter {
    DomainRouter::new(&FairConfig::builtin().unwrap().router)
}

proptest! {
    #[test]
    fn classify_is_deterministic(query in ".{0,200}") {
        let r = router();
        prop_assert_eq!(r.classify(&query), r.classify(&query));
    }

    #[test]
    fn classify_is_total(query in "\\PC{0,300}") {
        let domain = router().classify(&query);
        prop_assert!(matches!(
            domain,
            Domain::Finance | Domain::Medical | Domain::CrossDomain | Domain::Unknown
        ));
    }

    #[test]
    fn medicine_override_survives_threshold_changes(strong in 1usize..10, weak in 1usize..10) {
        let mut config = FairConfig::builtin().unwrap().router;
        config.weak_threshold = weak.min(strong);
        config.strong_threshold = strong.max(weak);
        prop_assert_eq!(DomainRouter::new(&config).classify("medicine"), Domain::Medical);
    }

    #[test]
    fn keyword_free_words_never_cross_domain(query in "[xyzqjk ]{0,60}") {
        prop_assert_ne!(router().classify(&query), Domain::CrossDomain);
    }
}

#[test]
fn separate_router_instances_agree() {
    let a = router();
    let b = router();
    for q in [
        "What is the ROI on a $10,000 investment?",
        "What are the symptoms of diabetes and what medication should I take?",
        "Compare the cost and price of cancer treatment",
        "hello",
    ] {
        assert_eq!(a.classify(q), b.classify(q));
    }
}
