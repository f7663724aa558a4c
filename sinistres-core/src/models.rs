use serde::{Deserialize, Deserializer, Serialize, Serializer, de::DeserializeOwned};
use std::fmt;

use crate::search::Searchable;

/// A REST collection managed by the backend.
///
/// Every resource is fetched, created, updated and deleted independently;
/// the client never merges a mutation locally and always re-fetches.
pub trait Resource: Searchable + Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Form payload used for create and update.
    type Draft: Serialize + Send + Sync;

    /// Path segment under `/api/v1`.
    const COLLECTION: &'static str;

    fn id(&self) -> &str;

    /// Human label shown in confirmation prompts.
    fn label(&self) -> String;
}

/// Defines a string-backed enum that keeps unknown backend values instead of failing.
macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
            Other(String),
        }

        impl $name {
            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $wire,)+
                    Self::Other(value) => value,
                }
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                match value {
                    $($wire => Self::$variant,)+
                    other => Self::Other(other.to_string()),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let value = String::deserialize(deserializer)?;
                Ok(Self::from(value.as_str()))
            }
        }
    };
}

wire_enum!(
    /// Processing status of a claim file.
    StatusDossier {
        Nouveau => "nouveau",
        EnCours => "en_cours",
        Expert => "expert",
        Validation => "validation",
        Escalade => "escalade",
        EnAttenteClient => "en_attente_client",
        Ferme => "fermé",
    }
);

wire_enum!(
    TypeTraitement {
        Autonome => "autonome",
        Escalade => "escalade",
        Expert => "expert",
    }
);

wire_enum!(
    TypeSinistre {
        Collision => "collision",
        Vol => "vol",
        Incendie => "incendie",
        Degats => "dégâts",
        Blessure => "blessure",
        Autre => "autre",
    }
);

wire_enum!(
    StatusRemboursement {
        EnAttente => "en_attente",
        Accepte => "accepté",
        Paye => "payé",
        Rejete => "rejeté",
    }
);

/// Client fields the backend embeds when it joins a resource to its owner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientSummary {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub matricule: Option<String>,
    #[serde(default)]
    pub nom: Option<String>,
    #[serde(default)]
    pub prenom: Option<String>,
    #[serde(default)]
    pub telephone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub matricule: String,
    pub nom: String,
    pub prenom: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub telephone: Option<String>,
    #[serde(default)]
    pub adresse: Option<String>,
    #[serde(default)]
    pub civilite: Option<String>,
    #[serde(default)]
    pub date_naissance: Option<String>,
    #[serde(default)]
    pub ville: Option<String>,
    #[serde(default)]
    pub code_postal: Option<String>,
    #[serde(default)]
    pub statut: Option<String>,
    #[serde(default)]
    pub date_creation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientDraft {
    pub matricule: String,
    pub nom: String,
    pub prenom: String,
    pub email: String,
    pub telephone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adresse: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub civilite: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ville: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_postal: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contrat {
    pub id: String,
    pub client_id: String,
    pub numero_contrat: String,
    pub type_assurance: String,
    #[serde(default)]
    pub date_debut: Option<String>,
    #[serde(default)]
    pub date_fin: Option<String>,
    #[serde(default)]
    pub statut: Option<String>,
    #[serde(default)]
    pub garantie_collision: bool,
    #[serde(default)]
    pub garantie_vol: bool,
    #[serde(default)]
    pub garantie_incendie: bool,
    #[serde(default)]
    pub garantie_responsabilite: bool,
    #[serde(default)]
    pub garantie_assistance: bool,
    #[serde(default)]
    pub franchise_collision: f64,
    #[serde(default)]
    pub franchise_vol: f64,
    #[serde(default)]
    pub franchise_incendie: f64,
    #[serde(default)]
    pub limite_responsabilite: f64,
    #[serde(default)]
    pub limite_collision: f64,
    #[serde(default)]
    pub limite_vol: f64,
    #[serde(default)]
    pub client: Option<ClientSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContratDraft {
    pub client_id: String,
    pub numero_contrat: String,
    pub type_assurance: String,
    pub date_debut: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_fin: Option<String>,
    pub statut: String,
    pub garantie_collision: bool,
    pub garantie_vol: bool,
    pub garantie_incendie: bool,
    pub garantie_responsabilite: bool,
    pub garantie_assistance: bool,
    pub franchise_collision: f64,
    pub franchise_vol: f64,
    pub franchise_incendie: f64,
    pub limite_responsabilite: f64,
    pub limite_collision: f64,
    pub limite_vol: f64,
}

impl Default for ContratDraft {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            numero_contrat: String::new(),
            type_assurance: "auto".to_string(),
            date_debut: String::new(),
            date_fin: None,
            statut: "actif".to_string(),
            garantie_collision: false,
            garantie_vol: false,
            garantie_incendie: false,
            garantie_responsabilite: true,
            garantie_assistance: true,
            franchise_collision: 500.0,
            franchise_vol: 500.0,
            franchise_incendie: 500.0,
            limite_responsabilite: 0.0,
            limite_collision: 0.0,
            limite_vol: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sinistre {
    pub id: String,
    pub client_id: String,
    pub numero_sinistre: String,
    pub type_sinistre: TypeSinistre,
    #[serde(default)]
    pub date_sinistre: Option<String>,
    #[serde(default)]
    pub lieu_sinistre: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Complexity index, 0 to 100.
    #[serde(default)]
    pub cci_score: Option<i64>,
    pub status_dossier: StatusDossier,
    #[serde(default)]
    pub type_traitement: Option<TypeTraitement>,
    #[serde(default)]
    pub documents_complets: Option<bool>,
    #[serde(default)]
    pub tiers_implique: Option<bool>,
    #[serde(default)]
    pub tiers_nom: Option<String>,
    #[serde(default)]
    pub date_creation: Option<String>,
    #[serde(default)]
    pub client: Option<ClientSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinistreDraft {
    pub client_id: String,
    /// Generated by the backend when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numero_sinistre: Option<String>,
    pub type_sinistre: TypeSinistre,
    pub date_sinistre: String,
    pub lieu_sinistre: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_dossier: Option<StatusDossier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_traitement: Option<TypeTraitement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cci_score: Option<i64>,
    pub tiers_implique: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tiers_nom: Option<String>,
    pub documents_complets: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConseillerSummary {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub nom: Option<String>,
    #[serde(default)]
    pub prenom: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub statut: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conseiller {
    pub id: String,
    pub nom: String,
    pub prenom: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub statut: Option<String>,
    #[serde(default)]
    pub nombre_dossiers_actifs: i64,
    #[serde(default)]
    pub capacite_max: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escalade {
    pub id: String,
    pub sinistre_id: String,
    #[serde(default)]
    pub conseiller_id: Option<String>,
    #[serde(default)]
    pub raison_escalade: Option<String>,
    #[serde(default)]
    pub cci_score_trigger: Option<i64>,
    pub status: String,
    #[serde(default)]
    pub date_escalade: Option<String>,
    #[serde(default)]
    pub date_transfert: Option<String>,
    #[serde(default)]
    pub date_completion: Option<String>,
    #[serde(default)]
    pub sinistre: Option<Box<Sinistre>>,
    #[serde(default)]
    pub conseiller: Option<ConseillerSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscaladeDraft {
    pub sinistre_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conseiller_id: Option<String>,
    pub raison_escalade: String,
    pub cci_score_trigger: i64,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Remboursement {
    pub id: String,
    pub sinistre_id: String,
    #[serde(default)]
    pub montant_reclame: f64,
    #[serde(default)]
    pub montant_accepte: Option<f64>,
    #[serde(default)]
    pub franchise: Option<f64>,
    #[serde(default)]
    pub montant_net: Option<f64>,
    pub status: StatusRemboursement,
    #[serde(default)]
    pub motif_rejet: Option<String>,
    #[serde(default)]
    pub date_paiement: Option<String>,
    #[serde(default)]
    pub reference_paiement: Option<String>,
    #[serde(default)]
    pub sinistre: Option<Box<Sinistre>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemboursementDraft {
    pub sinistre_id: String,
    pub montant_reclame: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub montant_accepte: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub franchise: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub montant_net: Option<f64>,
    pub status: StatusRemboursement,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motif_rejet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_paiement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_paiement: Option<String>,
}

/// One pending escalation in the advisor queue (`GET /escalades/queue`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedEscalade {
    pub escalade_id: String,
    pub status: String,
    #[serde(default)]
    pub raison: Option<String>,
    #[serde(default)]
    pub cci_score: Option<i64>,
    #[serde(default)]
    pub date_escalade: Option<String>,
    #[serde(default)]
    pub sinistre: Option<QueuedSinistre>,
    #[serde(default)]
    pub client: Option<ClientSummary>,
    #[serde(default)]
    pub conseiller: Option<ConseillerSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueuedSinistre {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub numero: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EscaladeQueue {
    pub count: u64,
    #[serde(default)]
    pub items: Vec<QueuedEscalade>,
}

impl Resource for Client {
    type Draft = ClientDraft;
    const COLLECTION: &'static str = "clients";

    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> String {
        format!("le client {}", self.matricule)
    }
}

impl Resource for Contrat {
    type Draft = ContratDraft;
    const COLLECTION: &'static str = "contrats";

    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> String {
        format!("le contrat {}", self.numero_contrat)
    }
}

impl Resource for Sinistre {
    type Draft = SinistreDraft;
    const COLLECTION: &'static str = "sinistres";

    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> String {
        format!("le sinistre {}", self.numero_sinistre)
    }
}

impl Resource for Escalade {
    type Draft = EscaladeDraft;
    const COLLECTION: &'static str = "escalades";

    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> String {
        "cette escalade".to_string()
    }
}

impl Resource for Remboursement {
    type Draft = RemboursementDraft;
    const COLLECTION: &'static str = "remboursements";

    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> String {
        "ce remboursement".to_string()
    }
}

/// Display-time join: the client owning `client_id`, if it is in the reference list.
pub fn lookup_client<'a>(clients: &'a [Client], client_id: &str) -> Option<&'a Client> {
    clients.iter().find(|c| c.id == client_id)
}
