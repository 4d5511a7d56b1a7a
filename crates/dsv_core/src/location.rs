//! Geographic level registry.
//!
//! A closed set of location levels. Each level statically declares its short
//! code, the ordered fields that identify one of its locations, and the CSV
//! columns it is read from. Adding a level is a compile error until every
//! `match` below handles it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ── Identity fields ────────────────────────────────────────────

/// A code field that can identify a location option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationField {
    Code,
    OldCode,
    Urn,
    LaEstab,
    Ukprn,
}

impl LocationField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::OldCode => "old_code",
            Self::Urn => "urn",
            Self::LaEstab => "laestab",
            Self::Ukprn => "ukprn",
        }
    }
}

/// Code values carried by a location option. Which of them identify the
/// option depends on its level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocationCodes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub laestab: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ukprn: Option<String>,
}

impl LocationCodes {
    pub fn with_code(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            ..Self::default()
        }
    }

    pub fn get(&self, field: LocationField) -> Option<&str> {
        match field {
            LocationField::Code => self.code.as_deref(),
            LocationField::OldCode => self.old_code.as_deref(),
            LocationField::Urn => self.urn.as_deref(),
            LocationField::LaEstab => self.laestab.as_deref(),
            LocationField::Ukprn => self.ukprn.as_deref(),
        }
    }

    pub fn as_map(&self) -> BTreeMap<LocationField, String> {
        [
            LocationField::Code,
            LocationField::OldCode,
            LocationField::Urn,
            LocationField::LaEstab,
            LocationField::Ukprn,
        ]
        .into_iter()
        .filter_map(|f| self.get(f).map(|v| (f, v.to_string())))
        .collect()
    }
}

// ── GeographicLevel ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GeographicLevel {
    Country,
    EnglishDevolvedArea,
    Institution,
    LocalAuthority,
    LocalAuthorityDistrict,
    LocalEnterprisePartnership,
    LocalSkillsImprovementPlanArea,
    MayoralCombinedAuthority,
    MultiAcademyTrust,
    OpportunityArea,
    ParliamentaryConstituency,
    PlanningArea,
    PoliceForceArea,
    Provider,
    Region,
    RscRegion,
    School,
    Sponsor,
    Ward,
}

impl GeographicLevel {
    pub const ALL: [GeographicLevel; 19] = [
        Self::Country,
        Self::EnglishDevolvedArea,
        Self::Institution,
        Self::LocalAuthority,
        Self::LocalAuthorityDistrict,
        Self::LocalEnterprisePartnership,
        Self::LocalSkillsImprovementPlanArea,
        Self::MayoralCombinedAuthority,
        Self::MultiAcademyTrust,
        Self::OpportunityArea,
        Self::ParliamentaryConstituency,
        Self::PlanningArea,
        Self::PoliceForceArea,
        Self::Provider,
        Self::Region,
        Self::RscRegion,
        Self::School,
        Self::Sponsor,
        Self::Ward,
    ];

    /// Short code used in storage and on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Country => "NAT",
            Self::EnglishDevolvedArea => "EDA",
            Self::Institution => "INST",
            Self::LocalAuthority => "LA",
            Self::LocalAuthorityDistrict => "LAD",
            Self::LocalEnterprisePartnership => "LEP",
            Self::LocalSkillsImprovementPlanArea => "LSIP",
            Self::MayoralCombinedAuthority => "MCA",
            Self::MultiAcademyTrust => "MAT",
            Self::OpportunityArea => "OA",
            Self::ParliamentaryConstituency => "PCON",
            Self::PlanningArea => "PA",
            Self::PoliceForceArea => "PFA",
            Self::Provider => "PROV",
            Self::Region => "REG",
            Self::RscRegion => "RSC",
            Self::School => "SCH",
            Self::Sponsor => "SPON",
            Self::Ward => "WARD",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.code() == code)
    }

    /// Ordered fields that, together with the label, identify a location.
    pub fn identity_fields(&self) -> &'static [LocationField] {
        match self {
            Self::LocalAuthority => &[LocationField::Code, LocationField::OldCode],
            Self::Provider => &[LocationField::Ukprn],
            Self::School => &[LocationField::Urn, LocationField::LaEstab],
            Self::RscRegion => &[],
            _ => &[LocationField::Code],
        }
    }

    pub fn csv_columns(&self) -> &'static LocationCsvColumns {
        // Table rows are declared in `ALL` order.
        let idx = Self::ALL
            .iter()
            .position(|level| level == self)
            .unwrap_or_default();
        &LOCATION_CSV_COLUMNS[idx]
    }
}

impl std::fmt::Display for GeographicLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ── CSV column table ───────────────────────────────────────────

/// CSV columns for one geographic level.
#[derive(Debug)]
pub struct LocationCsvColumns {
    pub level: GeographicLevel,
    pub name: &'static str,
    pub codes: &'static [(LocationField, &'static str)],
}

impl LocationCsvColumns {
    pub fn all(&self) -> impl Iterator<Item = &'static str> {
        let codes: &'static [(LocationField, &'static str)] = self.codes;
        codes
            .iter()
            .map(|(_, column)| *column)
            .chain(std::iter::once(self.name))
    }
}

use GeographicLevel as GL;
use LocationField as LF;

pub static LOCATION_CSV_COLUMNS: [LocationCsvColumns; 19] = [
    LocationCsvColumns {
        level: GL::Country,
        name: "country_name",
        codes: &[(LF::Code, "country_code")],
    },
    LocationCsvColumns {
        level: GL::EnglishDevolvedArea,
        name: "english_devolved_area_name",
        codes: &[(LF::Code, "english_devolved_area_code")],
    },
    LocationCsvColumns {
        level: GL::Institution,
        name: "institution_name",
        codes: &[(LF::Code, "institution_id")],
    },
    LocationCsvColumns {
        level: GL::LocalAuthority,
        name: "la_name",
        codes: &[(LF::Code, "new_la_code"), (LF::OldCode, "old_la_code")],
    },
    LocationCsvColumns {
        level: GL::LocalAuthorityDistrict,
        name: "lad_name",
        codes: &[(LF::Code, "lad_code")],
    },
    LocationCsvColumns {
        level: GL::LocalEnterprisePartnership,
        name: "local_enterprise_partnership_name",
        codes: &[(LF::Code, "local_enterprise_partnership_code")],
    },
    LocationCsvColumns {
        level: GL::LocalSkillsImprovementPlanArea,
        name: "lsip_name",
        codes: &[(LF::Code, "lsip_code")],
    },
    LocationCsvColumns {
        level: GL::MayoralCombinedAuthority,
        name: "cauth_name",
        codes: &[(LF::Code, "cauth_code")],
    },
    LocationCsvColumns {
        level: GL::MultiAcademyTrust,
        name: "trust_name",
        codes: &[(LF::Code, "trust_id")],
    },
    LocationCsvColumns {
        level: GL::OpportunityArea,
        name: "opportunity_area_name",
        codes: &[(LF::Code, "opportunity_area_code")],
    },
    LocationCsvColumns {
        level: GL::ParliamentaryConstituency,
        name: "pcon_name",
        codes: &[(LF::Code, "pcon_code")],
    },
    LocationCsvColumns {
        level: GL::PlanningArea,
        name: "planning_area_name",
        codes: &[(LF::Code, "planning_area_code")],
    },
    LocationCsvColumns {
        level: GL::PoliceForceArea,
        name: "pfa_name",
        codes: &[(LF::Code, "pfa_code")],
    },
    LocationCsvColumns {
        level: GL::Provider,
        name: "provider_name",
        codes: &[(LF::Ukprn, "provider_ukprn")],
    },
    LocationCsvColumns {
        level: GL::Region,
        name: "region_name",
        codes: &[(LF::Code, "region_code")],
    },
    LocationCsvColumns {
        level: GL::RscRegion,
        name: "rsc_region_lead_name",
        codes: &[],
    },
    LocationCsvColumns {
        level: GL::School,
        name: "school_name",
        codes: &[(LF::Urn, "school_urn"), (LF::LaEstab, "school_laestab")],
    },
    LocationCsvColumns {
        level: GL::Sponsor,
        name: "sponsor_name",
        codes: &[(LF::Code, "sponsor_id")],
    },
    LocationCsvColumns {
        level: GL::Ward,
        name: "ward_name",
        codes: &[(LF::Code, "ward_code")],
    },
];

/// Every location CSV column, in registry order (codes before name per level).
pub const ALL_LOCATION_CSV_COLUMNS: &[&str] = &[
    "country_code",
    "country_name",
    "english_devolved_area_code",
    "english_devolved_area_name",
    "institution_id",
    "institution_name",
    "new_la_code",
    "old_la_code",
    "la_name",
    "lad_code",
    "lad_name",
    "local_enterprise_partnership_code",
    "local_enterprise_partnership_name",
    "lsip_code",
    "lsip_name",
    "cauth_code",
    "cauth_name",
    "trust_id",
    "trust_name",
    "opportunity_area_code",
    "opportunity_area_name",
    "pcon_code",
    "pcon_name",
    "planning_area_code",
    "planning_area_name",
    "pfa_code",
    "pfa_name",
    "provider_ukprn",
    "provider_name",
    "region_code",
    "region_name",
    "rsc_region_lead_name",
    "school_urn",
    "school_laestab",
    "school_name",
    "sponsor_id",
    "sponsor_name",
    "ward_code",
    "ward_name",
];
