use crate::{
    error::{CalqueError, CalqueResult},
    model::{PhotoAttachment, Severity},
};

/// Session-wide selection of which findings variant is collected. Fixed for
/// the lifetime of a session; never mixed within one document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Mode {
    #[default]
    Supervision,
    Expertise,
}

/// One row of the materials table.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MaterialRow {
    #[serde(default)]
    pub material: String,
    #[serde(default)]
    pub thickness_mm: String,
}

/// Mode-dependent structured payload attached to an annotation. The
/// discriminant is the session mode; the two variants carry separate
/// materials lists and disjoint free-text fields. Empty text fields are
/// treated as absent and contribute nothing to the rendered document.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "mode")]
pub enum Findings {
    Supervision(SupervisionFindings),
    Expertise(ExpertiseFindings),
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SupervisionFindings {
    pub zone_name: String,
    pub materials: Vec<MaterialRow>,
    pub general_appreciation: String,
    pub step_done: String,
    pub work_planning: String,
    pub improvements: String,
    pub reserve: String,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ExpertiseFindings {
    pub zone_name: String,
    pub materials: Vec<MaterialRow>,
    pub age: String,
    pub damage_nature: String,
    pub damage_description: String,
    pub probable_cause: String,
    pub potential_origins: String,
    pub immediate_recommendations: String,
    pub long_term_recommendations: String,
}

impl Findings {
    pub fn empty(mode: Mode) -> Self {
        match mode {
            Mode::Supervision => Self::Supervision(SupervisionFindings::default()),
            Mode::Expertise => Self::Expertise(ExpertiseFindings::default()),
        }
    }

    pub fn mode(&self) -> Mode {
        match self {
            Self::Supervision(_) => Mode::Supervision,
            Self::Expertise(_) => Mode::Expertise,
        }
    }

    pub fn zone_name(&self) -> &str {
        match self {
            Self::Supervision(f) => &f.zone_name,
            Self::Expertise(f) => &f.zone_name,
        }
    }

    pub fn materials(&self) -> &[MaterialRow] {
        match self {
            Self::Supervision(f) => &f.materials,
            Self::Expertise(f) => &f.materials,
        }
    }

    /// Appends a materials row.
    pub fn push_material(&mut self, row: MaterialRow) {
        match self {
            Self::Supervision(f) => f.materials.push(row),
            Self::Expertise(f) => f.materials.push(row),
        }
    }

    /// Removes the row at `index`. Removing the only remaining row leaves an
    /// empty list, never a missing one.
    pub fn remove_material(&mut self, index: usize) -> CalqueResult<MaterialRow> {
        let materials = match self {
            Self::Supervision(f) => &mut f.materials,
            Self::Expertise(f) => &mut f.materials,
        };
        if index >= materials.len() {
            return Err(CalqueError::validation(format!(
                "no materials row at index {index}"
            )));
        }
        Ok(materials.remove(index))
    }

    /// The variant's free-text fields as (label, value) pairs in their fixed
    /// emission order. Values may be empty; the compositor skips those.
    pub fn text_fields(&self) -> Vec<(&'static str, &str)> {
        match self {
            Self::Supervision(f) => vec![
                ("Appréciation générale", &f.general_appreciation),
                ("Étape réalisée", &f.step_done),
                ("Planification des travaux", &f.work_planning),
                ("Améliorations proposées", &f.improvements),
                ("Réserve", &f.reserve),
            ],
            Self::Expertise(f) => vec![
                ("Âge depuis réparation", &f.age),
                ("Nature des dommages", &f.damage_nature),
                ("Description des dommages", &f.damage_description),
                ("Cause probable", &f.probable_cause),
                ("Origines potentielles", &f.potential_origins),
                ("Recommandations immédiates", &f.immediate_recommendations),
                ("Recommandations long terme", &f.long_term_recommendations),
            ],
        }
    }
}

/// The flat payload a findings form submits for one annotation: the shared
/// severity, the mode-shaped findings, and the ordered photo attachments
/// (payloads paired with their descriptions).
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FormSubmission {
    #[serde(default)]
    pub severity: Severity,
    #[serde(flatten)]
    pub findings: Findings,
    #[serde(default)]
    pub photos: Vec<PhotoAttachment>,
}

impl FormSubmission {
    pub fn new(findings: Findings) -> Self {
        Self {
            severity: Severity::default(),
            findings,
            photos: Vec::new(),
        }
    }

    /// Rebuilds a submission from the transport form: parallel photo payload
    /// and description arrays keyed by position. Fails when the arrays have
    /// drifted out of alignment.
    pub fn from_parallel_photos(
        severity: Severity,
        findings: Findings,
        photos: Vec<(crate::model::AttachmentKind, Vec<u8>)>,
        photo_descriptions: Vec<String>,
    ) -> CalqueResult<Self> {
        if photos.len() != photo_descriptions.len() {
            return Err(CalqueError::validation(format!(
                "photos/photoDescriptions length mismatch: {} vs {}",
                photos.len(),
                photo_descriptions.len()
            )));
        }
        let photos = photos
            .into_iter()
            .zip(photo_descriptions)
            .map(|((kind, bytes), description)| PhotoAttachment {
                kind,
                description,
                bytes,
            })
            .collect();
        Ok(Self {
            severity,
            findings,
            photos,
        })
    }
}
