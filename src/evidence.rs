use serde::Serialize;
use std::collections::HashSet;

use crate::patient::{Metabolizer, Ugt1a9Activity};

/// Bucket a citation belongs to in the evidence summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceCategory {
    Pharmacokinetics,
    Pharmacodynamics,
    ClinicalGuidelines,
}

/// A literature source backing a clinical or genetic rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Citation {
    pub id: &'static str,
    pub category: EvidenceCategory,
}

/// Citation registry. Every rule in the pipeline points at one or more of
/// these entries; nothing cites free-form text.
pub mod refs {
    use super::Citation;
    use super::EvidenceCategory::*;

    const fn cite(id: &'static str, category: super::EvidenceCategory) -> Citation {
        Citation { id, category }
    }

    // Route selection
    pub const RYR1_MH: Citation = cite("PMID:31386658", ClinicalGuidelines);
    pub const MHAUS_GUIDELINES: Citation = cite("MHAUS-Guidelines-2023", ClinicalGuidelines);
    pub const IV_TITRATABLE: Citation = cite("PMID:28248699", ClinicalGuidelines);
    pub const ASA_PRACTICE: Citation = cite("PMID:26378978", ClinicalGuidelines);
    pub const PEDIATRIC_INHALATION: Citation = cite("PMID:30843482", ClinicalGuidelines);

    // Agent selection
    pub const PROPOFOL_HYPOTENSION_ELDERLY: Citation = cite("PMID:35489305", ClinicalGuidelines);
    pub const PROPOFOL_HYPOTENSION_META: Citation = cite("PMID:34916051", ClinicalGuidelines);
    pub const PROPOFOL_INDUCTION_RISK: Citation = cite("PMID:34859868", ClinicalGuidelines);
    pub const PROPOFOL_PONV: Citation = cite("PMID:25296857", ClinicalGuidelines);
    pub const ETOMIDATE_ADRENAL_META: Citation = cite("PMID:22441015", ClinicalGuidelines);
    pub const ETOMIDATE_ADRENAL_RCT: Citation = cite("PMID:17060330", ClinicalGuidelines);
    pub const ETOMIDATE_ADRENAL_REVIEW: Citation = cite("PMID:23426219", ClinicalGuidelines);
    pub const ETOMIDATE_HEMODYNAMIC_RCT: Citation = cite("PMID:31761720", ClinicalGuidelines);
    pub const ETOMIDATE_HEMODYNAMIC_META: Citation = cite("PMID:32654187", ClinicalGuidelines);
    pub const KETAMINE_CARDIOVASCULAR: Citation = cite("PMID:26867833", ClinicalGuidelines);
    pub const KETAMINE_CV_PROFILE: Citation = cite("PMID:23250431", ClinicalGuidelines);
    pub const KETAMINE_BRONCHODILATION: Citation = cite("PMID:29487156", ClinicalGuidelines);
    pub const KETAMINE_ASTHMA_SERIES: Citation = cite("PMID:20656763", ClinicalGuidelines);
    pub const SEVOFLURANE_AIRWAY: Citation = cite("PMID:8250714", ClinicalGuidelines);
    pub const SEVOFLURANE_INDUCTION: Citation = cite("PMID:8659733", ClinicalGuidelines);
    pub const DESFLURANE_IRRITATION: Citation = cite("PMID:7818105", ClinicalGuidelines);
    pub const DESFLURANE_EMERGENCE: Citation = cite("PMID:1952180", ClinicalGuidelines);
    pub const DESFLURANE_RECOVERY: Citation = cite("PMID:7631926", ClinicalGuidelines);
    pub const ISOFLURANE_MAC: Citation = cite("PMID:6859426", ClinicalGuidelines);

    // Pharmacokinetic genetics
    pub const CYP2B6_PROPOFOL: Citation = cite("PMID:36717987", Pharmacokinetics);
    pub const CYP2B6_KETAMINE: Citation = cite("PMID:38135504", Pharmacokinetics);
    pub const UGT1A9_GLUCURONIDATION: Citation = cite("PMID:15184982", Pharmacokinetics);
    pub const CYP3A4_KETAMINE: Citation = cite("PMID:12065445", Pharmacokinetics);
    pub const PROPOFOL_PGX_COLONOSCOPY: Citation = cite("PMID:37227973", Pharmacokinetics);
    pub const PROPOFOL_PGX_REVIEW: Citation = cite("PMID:35295593", Pharmacokinetics);

    // Clinical dose adjustment
    pub const ELDERLY_DOSE_REDUCTION: Citation = cite("PMID:35418861", ClinicalGuidelines);
    pub const ASA_CLASSIFICATION: Citation = cite("ASA-PS-Classification", ClinicalGuidelines);
    pub const PROPOFOL_VASODILATION: Citation = cite("PMID:7914708", ClinicalGuidelines);
    pub const DIPRIVAN_LABEL: Citation = cite("FDA:Diprivan-PI", ClinicalGuidelines);
    pub const AMIDATE_LABEL: Citation = cite("FDA:Amidate-PI", ClinicalGuidelines);
    pub const KETALAR_LABEL: Citation = cite("FDA:Ketalar-PI", ClinicalGuidelines);
    pub const MAPLESON_MAC_AGE: Citation = cite("PMID:8777094", ClinicalGuidelines);
    pub const NEUROMONITORING_MAC: Citation = cite("Neuromonitoring-0.5MAC-Practice", ClinicalGuidelines);

    // Pharmacodynamic genetics and response modeling
    pub const GABRA1_SENSITIVITY: Citation = cite("PMID:35173461", Pharmacodynamics);
    pub const GABRA1_MECHANISM: Citation = cite("PMID:32027346", Pharmacodynamics);
    pub const COMT_PAIN: Citation = cite("PMID:15927391", Pharmacodynamics);
    pub const COMT_META: Citation = cite("PMID:23210659", Pharmacodynamics);
    pub const OPRM1_OPIOID: Citation = cite("PMID:19706592", Pharmacodynamics);
    pub const OPRM1_CLINICAL: Citation = cite("PMID:30028366", Pharmacodynamics);
    pub const CACNA1C_CV: Citation = cite("PMID:25533539", Pharmacodynamics);
    pub const CACNA1C_RESPONSE: Citation = cite("PMID:22832964", Pharmacodynamics);
    pub const PROPOFOL_ED50: Citation = cite("PMID:8110547", Pharmacodynamics);
    pub const TCI_EMAX_CONTEXT: Citation = cite("PMID:26516798", Pharmacodynamics);
    pub const ETOMIDATE_PD: Citation = cite("NBK:535364", Pharmacodynamics);
}

/// A single self-documenting numeric change applied somewhere in the
/// pipeline. The multiplier may be below, at, or above 1.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AdjustmentFactor {
    pub name: String,
    pub multiplier: f64,
    pub citations: Vec<Citation>,
}

impl AdjustmentFactor {
    pub fn new(name: impl Into<String>, multiplier: f64, citations: &[Citation]) -> Self {
        Self {
            name: name.into(),
            multiplier,
            citations: citations.to_vec(),
        }
    }
}

/// Clearance effect of a CYP metabolizer phenotype, relative to NM.
pub struct MetabolizerEffects {
    pub pm: f64,
    pub im: f64,
    pub nm: f64,
    pub rm: f64,
    pub citations: &'static [Citation],
}

impl MetabolizerEffects {
    pub fn clearance_factor(&self, status: Metabolizer) -> f64 {
        match status {
            Metabolizer::Pm => self.pm,
            Metabolizer::Im => self.im,
            Metabolizer::Nm => self.nm,
            Metabolizer::Rm => self.rm,
        }
    }
}

pub static CYP2B6_CLEARANCE: MetabolizerEffects = MetabolizerEffects {
    pm: 0.70,
    im: 0.85,
    nm: 1.00,
    rm: 1.20,
    citations: &[refs::CYP2B6_PROPOFOL, refs::CYP2B6_KETAMINE, refs::PROPOFOL_PGX_REVIEW],
};

pub static CYP3A4_CLEARANCE: MetabolizerEffects = MetabolizerEffects {
    pm: 0.80,
    im: 0.90,
    nm: 1.00,
    rm: 1.10,
    citations: &[refs::CYP3A4_KETAMINE],
};

pub static CYP2C9_CLEARANCE: MetabolizerEffects = MetabolizerEffects {
    pm: 0.92,
    im: 0.96,
    nm: 1.00,
    rm: 1.05,
    citations: &[refs::PROPOFOL_PGX_COLONOSCOPY],
};

/// Clearance effect of UGT1A9 activity, relative to normal.
pub struct Ugt1a9Effects {
    pub decreased: f64,
    pub normal: f64,
    pub increased: f64,
    pub citations: &'static [Citation],
}

impl Ugt1a9Effects {
    pub fn clearance_factor(&self, activity: Ugt1a9Activity) -> f64 {
        match activity {
            Ugt1a9Activity::Decreased => self.decreased,
            Ugt1a9Activity::Normal => self.normal,
            Ugt1a9Activity::Increased => self.increased,
        }
    }
}

pub static UGT1A9_CLEARANCE: Ugt1a9Effects = Ugt1a9Effects {
    decreased: 0.85,
    normal: 1.00,
    increased: 1.15,
    citations: &[refs::UGT1A9_GLUCURONIDATION, refs::PROPOFOL_PGX_COLONOSCOPY],
};

/// Which agents a pharmacodynamic marker acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdTarget {
    /// GABA-A mediated intravenous hypnotics (propofol, etomidate).
    Gabaergic,
    /// NMDA antagonist (ketamine).
    NmdaAntagonist,
    /// Marker modulates the response to every agent.
    All,
}

/// EC50 shift associated with one genotyped variant of one PD marker.
pub struct PdVariantEffect {
    pub gene: &'static str,
    pub variant: &'static str,
    pub effect: &'static str,
    pub ec50_hypnosis_factor: f64,
    pub ec50_adverse_factor: f64,
    pub target: PdTarget,
    pub citations: &'static [Citation],
}

static GABRA1_CITES: &[Citation] = &[refs::GABRA1_SENSITIVITY, refs::GABRA1_MECHANISM];
static COMT_CITES: &[Citation] = &[refs::COMT_PAIN, refs::COMT_META];
static OPRM1_CITES: &[Citation] = &[refs::OPRM1_OPIOID, refs::OPRM1_CLINICAL];
static CACNA1C_CITES: &[Citation] = &[refs::CACNA1C_CV, refs::CACNA1C_RESPONSE];

/// Pharmacodynamic variant table. GABRA1 shifts both response curves of the
/// GABAergic hypnotics; OPRM1 shifts the hypnosis curve of ketamine; COMT
/// and CACNA1C shift the adverse-event curve of every agent.
pub static PD_VARIANTS: &[PdVariantEffect] = &[
    PdVariantEffect {
        gene: "gabra1",
        variant: "rs4263535:G/G",
        effect: "Increased sensitivity (15% lower EC50)",
        ec50_hypnosis_factor: 0.85,
        ec50_adverse_factor: 0.85,
        target: PdTarget::Gabaergic,
        citations: GABRA1_CITES,
    },
    PdVariantEffect {
        gene: "gabra1",
        variant: "rs4263535:A/G",
        effect: "Moderately increased sensitivity (7% lower EC50)",
        ec50_hypnosis_factor: 0.93,
        ec50_adverse_factor: 0.93,
        target: PdTarget::Gabaergic,
        citations: GABRA1_CITES,
    },
    PdVariantEffect {
        gene: "gabra1",
        variant: "rs4263535:A/A",
        effect: "Normal sensitivity (reference)",
        ec50_hypnosis_factor: 1.00,
        ec50_adverse_factor: 1.00,
        target: PdTarget::Gabaergic,
        citations: GABRA1_CITES,
    },
    PdVariantEffect {
        gene: "comt",
        variant: "Val158Met:Met/Met",
        effect: "Higher stress/pain sensitivity (15% lower adverse EC50)",
        ec50_hypnosis_factor: 1.00,
        ec50_adverse_factor: 0.85,
        target: PdTarget::All,
        citations: COMT_CITES,
    },
    PdVariantEffect {
        gene: "comt",
        variant: "Val158Met:Val/Met",
        effect: "Intermediate sensitivity (7% lower adverse EC50)",
        ec50_hypnosis_factor: 1.00,
        ec50_adverse_factor: 0.93,
        target: PdTarget::All,
        citations: COMT_CITES,
    },
    PdVariantEffect {
        gene: "comt",
        variant: "Val158Met:Val/Val",
        effect: "Normal sensitivity (reference)",
        ec50_hypnosis_factor: 1.00,
        ec50_adverse_factor: 1.00,
        target: PdTarget::All,
        citations: COMT_CITES,
    },
    PdVariantEffect {
        gene: "oprm1",
        variant: "A118G:G/G",
        effect: "Reduced receptor sensitivity (15% higher hypnosis EC50)",
        ec50_hypnosis_factor: 1.15,
        ec50_adverse_factor: 1.00,
        target: PdTarget::NmdaAntagonist,
        citations: OPRM1_CITES,
    },
    PdVariantEffect {
        gene: "oprm1",
        variant: "A118G:A/G",
        effect: "Moderately reduced sensitivity (8% higher hypnosis EC50)",
        ec50_hypnosis_factor: 1.08,
        ec50_adverse_factor: 1.00,
        target: PdTarget::NmdaAntagonist,
        citations: OPRM1_CITES,
    },
    PdVariantEffect {
        gene: "oprm1",
        variant: "A118G:A/A",
        effect: "Normal sensitivity (reference)",
        ec50_hypnosis_factor: 1.00,
        ec50_adverse_factor: 1.00,
        target: PdTarget::NmdaAntagonist,
        citations: OPRM1_CITES,
    },
    PdVariantEffect {
        gene: "cacna1c",
        variant: "rs1006737:A/A",
        effect: "Reduced calcium-channel sensitivity (10% higher adverse EC50)",
        ec50_hypnosis_factor: 1.00,
        ec50_adverse_factor: 1.10,
        target: PdTarget::All,
        citations: CACNA1C_CITES,
    },
    PdVariantEffect {
        gene: "cacna1c",
        variant: "rs1006737:A/G",
        effect: "Moderately reduced sensitivity (5% higher adverse EC50)",
        ec50_hypnosis_factor: 1.00,
        ec50_adverse_factor: 1.05,
        target: PdTarget::All,
        citations: CACNA1C_CITES,
    },
    PdVariantEffect {
        gene: "cacna1c",
        variant: "rs1006737:G/G",
        effect: "Normal sensitivity (reference)",
        ec50_hypnosis_factor: 1.00,
        ec50_adverse_factor: 1.00,
        target: PdTarget::All,
        citations: CACNA1C_CITES,
    },
];

pub fn pd_variant(gene: &str, variant: &str) -> Option<&'static PdVariantEffect> {
    PD_VARIANTS
        .iter()
        .find(|v| v.gene == gene && v.variant == variant)
}

/// Valid variant keys for one gene, in table order. Used to build
/// validation messages.
pub fn pd_variant_names(gene: &str) -> Vec<&'static str> {
    PD_VARIANTS
        .iter()
        .filter(|v| v.gene == gene)
        .map(|v| v.variant)
        .collect()
}

/// Implemented by every pipeline output that carries citations, so the
/// aggregator can walk them without knowing their shapes.
pub trait CitesEvidence {
    fn collect_citations(&self, out: &mut Vec<Citation>);
}

/// Deduplicated, categorized view of every source the plan relied on.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EvidenceSummary {
    pub total_sources: usize,
    pub pharmacokinetics: usize,
    pub pharmacodynamics: usize,
    pub clinical_guidelines: usize,
    pub sources: Vec<Citation>,
    pub evidence_grade: &'static str,
}

/// The grade is a fixed label for the registry as a whole; it is not
/// derived from the individual sources cited by a given plan.
pub const EVIDENCE_GRADE: &str = "A/B (peer-reviewed literature)";

/// Walk every citation surfaced upstream, deduplicate by id preserving the
/// first occurrence, and bucket by category.
pub fn aggregate(components: &[&dyn CitesEvidence]) -> EvidenceSummary {
    let mut raw = Vec::new();
    for component in components {
        component.collect_citations(&mut raw);
    }

    let mut seen: HashSet<&'static str> = HashSet::new();
    let mut sources = Vec::new();
    for citation in raw {
        if seen.insert(citation.id) {
            sources.push(citation);
        }
    }

    let count = |category: EvidenceCategory| {
        sources.iter().filter(|c| c.category == category).count()
    };

    EvidenceSummary {
        total_sources: sources.len(),
        pharmacokinetics: count(EvidenceCategory::Pharmacokinetics),
        pharmacodynamics: count(EvidenceCategory::Pharmacodynamics),
        clinical_guidelines: count(EvidenceCategory::ClinicalGuidelines),
        sources,
        evidence_grade: EVIDENCE_GRADE,
    }
}
