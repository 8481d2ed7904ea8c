//! Label vocabularies: entity label mapping and contract-type term profiles.
//!
//! NER models disagree on naming (`ORG` vs `ORGANIZATION`, `DATE` vs `DATES`).
//! Everything is folded onto [`EntityLabel`]; anything unrecognised becomes
//! [`EntityLabel::Other`].

use contrisk_core::EntityLabel;

/// Contract types the lexicon classifier knows about.
pub const CONTRACT_TYPES: &[&str] = &[
    "employment",
    "vendor",
    "lease",
    "partnership",
    "service",
    "nda",
    "consultancy",
];

/// Map an external model's entity label onto the fixed label set.
///
/// Case and surrounding whitespace are ignored; BIO prefixes (`B-`, `I-`)
/// are stripped.
pub fn normalize_entity_label(raw: &str) -> EntityLabel {
    let trimmed = raw.trim();
    let bare = trimmed
        .strip_prefix("B-")
        .or_else(|| trimmed.strip_prefix("I-"))
        .or_else(|| trimmed.strip_prefix("b-"))
        .or_else(|| trimmed.strip_prefix("i-"))
        .unwrap_or(trimmed);

    match bare.to_ascii_uppercase().as_str() {
        "PERSON" | "PER" | "ORG" | "PARTY" | "PARTIES" | "ORGANIZATION" | "ORGANISATION" => {
            EntityLabel::Party
        }
        "DATE" | "TIME" | "DATES" => EntityLabel::Date,
        "MONEY" | "AMOUNT" | "CURRENCY" | "AMOUNTS" => EntityLabel::Money,
        "DURATION" | "PERIOD" => EntityLabel::Duration,
        "OBLIGATION" | "DUTY" => EntityLabel::Obligation,
        _ => EntityLabel::Other,
    }
}

/// Canonical form of a classifier label: trimmed, internal whitespace
/// collapsed to `_`. Case is kept so risk-category labels still match the
/// dictionary's category names.
pub fn normalize_class_label(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Indicative terms per contract type.
pub const CONTRACT_TYPE_PROFILES: &[(&str, &[&str])] = &[
    (
        "employment",
        &[
            "employee",
            "employer",
            "employment",
            "salary",
            "wages",
            "position",
            "probation",
        ],
    ),
    (
        "vendor",
        &[
            "vendor",
            "supplier",
            "purchase order",
            "goods",
            "delivery",
            "invoice",
        ],
    ),
    (
        "lease",
        &["landlord", "tenant", "lease", "premises", "rent", "lessee"],
    ),
    (
        "partnership",
        &[
            "partner",
            "partners",
            "partnership",
            "profits",
            "capital contribution",
        ],
    ),
    (
        "service",
        &[
            "service provider",
            "services",
            "service level",
            "client",
            "statement of work",
        ],
    ),
    (
        "nda",
        &[
            "confidential information",
            "disclosing party",
            "receiving party",
            "non disclosure",
        ],
    ),
    (
        "consultancy",
        &[
            "consultant",
            "consulting",
            "consultancy",
            "advisory",
            "deliverables",
        ],
    ),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn party_aliases_map_to_party() {
        for raw in ["PERSON", "ORG", "party", "Parties", "ORGANIZATION", " org "] {
            assert_eq!(normalize_entity_label(raw), EntityLabel::Party, "{raw}");
        }
    }

    #[test]
    fn temporal_and_money_aliases() {
        assert_eq!(normalize_entity_label("TIME"), EntityLabel::Date);
        assert_eq!(normalize_entity_label("DATES"), EntityLabel::Date);
        assert_eq!(normalize_entity_label("CURRENCY"), EntityLabel::Money);
        assert_eq!(normalize_entity_label("AMOUNTS"), EntityLabel::Money);
        assert_eq!(normalize_entity_label("PERIOD"), EntityLabel::Duration);
        assert_eq!(normalize_entity_label("DUTY"), EntityLabel::Obligation);
    }

    #[test]
    fn bio_prefixes_are_stripped() {
        assert_eq!(normalize_entity_label("B-ORG"), EntityLabel::Party);
        assert_eq!(normalize_entity_label("I-MONEY"), EntityLabel::Money);
    }

    #[test]
    fn unknown_labels_become_other() {
        assert_eq!(normalize_entity_label("LAW"), EntityLabel::Other);
        assert_eq!(normalize_entity_label("GPE"), EntityLabel::Other);
        assert_eq!(normalize_entity_label(""), EntityLabel::Other);
    }

    #[test]
    fn class_labels_keep_case() {
        assert_eq!(normalize_class_label("  penalty_risk "), "penalty_risk");
        assert_eq!(normalize_class_label("Late  Payment"), "Late_Payment");
        assert_eq!(normalize_class_label("   "), "");
    }

    #[test]
    fn every_contract_type_has_a_profile() {
        assert_eq!(CONTRACT_TYPE_PROFILES.len(), CONTRACT_TYPES.len());
        for (label, terms) in CONTRACT_TYPE_PROFILES {
            assert!(CONTRACT_TYPES.contains(label));
            assert!(!terms.is_empty());
        }
    }
}
