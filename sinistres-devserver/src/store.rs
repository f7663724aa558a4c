use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use sinistres_core::models::{
    Client, ClientSummary, Conseiller, ConseillerSummary, Contrat, Escalade, Remboursement,
    Sinistre, StatusDossier, StatusRemboursement, TypeSinistre, TypeTraitement,
};

struct Row<T> {
    seq: u64,
    value: T,
}

/// One collection, listed newest first.
pub struct Table<T> {
    rows: DashMap<String, Row<T>>,
    seq: AtomicU64,
}

impl<T: Clone> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: DashMap::new(),
            seq: AtomicU64::new(0),
        }
    }
}

impl<T: Clone> Table<T> {
    pub fn insert(&self, id: String, value: T) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        self.rows.insert(id, Row { seq, value });
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.rows.get(id).map(|row| row.value.clone())
    }

    /// Applies `update` in place and returns the new value.
    pub fn update(&self, id: &str, update: impl FnOnce(&mut T)) -> Option<T> {
        self.rows.get_mut(id).map(|mut row| {
            update(&mut row.value);
            row.value.clone()
        })
    }

    pub fn remove(&self, id: &str) -> Option<T> {
        self.rows.remove(id).map(|(_, row)| row.value)
    }

    /// Removes every row matching `pred` and returns the removed ids.
    pub fn remove_where(&self, pred: impl Fn(&T) -> bool) -> Vec<String> {
        let ids: Vec<String> = self
            .rows
            .iter()
            .filter(|row| pred(&row.value))
            .map(|row| row.key().clone())
            .collect();
        ids.into_iter()
            .filter(|id| self.rows.remove(id).is_some())
            .collect()
    }

    pub fn list(&self) -> Vec<T> {
        let mut rows: Vec<(u64, T)> = self
            .rows
            .iter()
            .map(|row| (row.seq, row.value.clone()))
            .collect();
        rows.sort_by(|a, b| b.0.cmp(&a.0));
        rows.into_iter().map(|(_, value)| value).collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Whole backend state. Joined fields (`client`, `sinistre`, `conseiller`)
/// are never stored; they are attached when a record is served.
#[derive(Default)]
pub struct Store {
    pub clients: Table<Client>,
    pub contrats: Table<Contrat>,
    pub sinistres: Table<Sinistre>,
    pub escalades: Table<Escalade>,
    pub remboursements: Table<Remboursement>,
    pub conseillers: Table<Conseiller>,
    /// Uppercased matricule to client id.
    matricules: DashMap<String, String>,
}

/// A matricule is already held by another client.
#[derive(Debug, PartialEq, Eq)]
pub struct DuplicateMatricule;

fn matricule_key(matricule: &str) -> String {
    matricule.trim().to_uppercase()
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store with a handful of clients, contracts, claims and advisors.
    pub fn seeded() -> Arc<Self> {
        let store = Self::new();
        let created = now_iso();

        let dupont = seed_client(&store, "AB-4521-22", "Dupont", "Jean", &created);
        let benali = seed_client(&store, "FC-7834-19", "Benali", "Sara", &created);

        for (client, numero, kind) in [
            (&dupont, "CTR-2024-0001", "auto"),
            (&benali, "CTR-2024-0002", "habitation"),
        ] {
            let id = new_id();
            store.contrats.insert(
                id.clone(),
                Contrat {
                    id,
                    client_id: client.id.clone(),
                    numero_contrat: numero.to_string(),
                    type_assurance: kind.to_string(),
                    date_debut: Some("2024-01-01".to_string()),
                    date_fin: None,
                    statut: Some("actif".to_string()),
                    garantie_collision: true,
                    garantie_vol: true,
                    garantie_incendie: false,
                    garantie_responsabilite: true,
                    garantie_assistance: true,
                    franchise_collision: 500.0,
                    franchise_vol: 500.0,
                    franchise_incendie: 500.0,
                    limite_responsabilite: 50000.0,
                    limite_collision: 50000.0,
                    limite_vol: 50000.0,
                    client: None,
                },
            );
        }

        let collision = seed_sinistre(
            &store,
            &dupont,
            "SINS-20240115103000",
            TypeSinistre::Collision,
            "J'ai été percuté à l'arrière au feu rouge. Le conducteur a reconnu sa faute.",
            28,
            StatusDossier::EnCours,
            &created,
        );
        let vol = seed_sinistre(
            &store,
            &benali,
            "SINS-20240203160000",
            TypeSinistre::Vol,
            "Je pense que la porte était mal fermée. Je suis très inquiète, tout a disparu !",
            74,
            StatusDossier::Escalade,
            &created,
        );

        let conseiller_id = new_id();
        store.conseillers.insert(
            conseiller_id.clone(),
            Conseiller {
                id: conseiller_id.clone(),
                nom: "Martin".to_string(),
                prenom: "Claire".to_string(),
                email: Some("claire.martin@assurance.example".to_string()),
                statut: Some("disponible".to_string()),
                nombre_dossiers_actifs: 3,
                capacite_max: 10,
            },
        );

        let escalade_id = new_id();
        store.escalades.insert(
            escalade_id.clone(),
            Escalade {
                id: escalade_id,
                sinistre_id: vol.id.clone(),
                conseiller_id: Some(conseiller_id),
                raison_escalade: Some("CCI élevé".to_string()),
                cci_score_trigger: vol.cci_score,
                status: "en_attente".to_string(),
                date_escalade: Some(created.clone()),
                date_transfert: None,
                date_completion: None,
                sinistre: None,
                conseiller: None,
            },
        );

        let remboursement_id = new_id();
        store.remboursements.insert(
            remboursement_id.clone(),
            Remboursement {
                id: remboursement_id,
                sinistre_id: collision.id.clone(),
                montant_reclame: 1800.0,
                montant_accepte: Some(1500.0),
                franchise: Some(500.0),
                montant_net: Some(1000.0),
                status: StatusRemboursement::Accepte,
                motif_rejet: None,
                date_paiement: None,
                reference_paiement: None,
                sinistre: None,
            },
        );

        Arc::new(store)
    }

    pub fn client_by_matricule(&self, matricule: &str) -> Option<Client> {
        let id = self.matricules.get(&matricule_key(matricule))?.clone();
        self.clients.get(&id)
    }

    /// Inserts `client` unless its matricule is taken.
    pub fn add_client(&self, client: Client) -> Result<(), DuplicateMatricule> {
        match self.matricules.entry(matricule_key(&client.matricule)) {
            Entry::Occupied(_) => Err(DuplicateMatricule),
            Entry::Vacant(slot) => {
                slot.insert(client.id.clone());
                self.clients.insert(client.id.clone(), client);
                Ok(())
            }
        }
    }

    /// Moves client `id` to `matricule`, reserving the new key before the old one is released.
    pub fn rename_matricule(&self, id: &str, matricule: &str) -> Result<(), DuplicateMatricule> {
        let Some(client) = self.clients.get(id) else {
            return Ok(());
        };
        let old = matricule_key(&client.matricule);
        let new = matricule_key(matricule);
        if old == new {
            return Ok(());
        }
        match self.matricules.entry(new) {
            Entry::Occupied(_) => return Err(DuplicateMatricule),
            Entry::Vacant(slot) => {
                slot.insert(id.to_string());
            }
        }
        self.matricules.remove_if(&old, |_, owner| owner == id);
        Ok(())
    }

    /// Deletes a claim with its escalations and reimbursements.
    pub fn remove_sinistre(&self, id: &str) -> Option<Sinistre> {
        let sinistre = self.sinistres.remove(id)?;
        let escalades = self.escalades.remove_where(|e| e.sinistre_id == id);
        let remboursements = self.remboursements.remove_where(|r| r.sinistre_id == id);
        tracing::debug!(
            sinistre_id = %id,
            escalades = escalades.len(),
            remboursements = remboursements.len(),
            "claim children removed"
        );
        Some(sinistre)
    }

    /// Deletes a client with its contracts and claims.
    pub fn remove_client(&self, id: &str) -> Option<Client> {
        let client = self.clients.remove(id)?;
        self.matricules
            .remove_if(&matricule_key(&client.matricule), |_, owner| owner == id);
        self.contrats.remove_where(|c| c.client_id == id);
        let claims: Vec<String> = self
            .sinistres
            .list()
            .into_iter()
            .filter(|s| s.client_id == id)
            .map(|s| s.id)
            .collect();
        for claim in &claims {
            self.remove_sinistre(claim);
        }
        Some(client)
    }

    pub fn client_summary(&self, client_id: &str) -> Option<ClientSummary> {
        self.clients.get(client_id).map(|c| ClientSummary {
            id: Some(c.id),
            matricule: Some(c.matricule),
            nom: Some(c.nom),
            prenom: Some(c.prenom),
            telephone: c.telephone,
            email: c.email,
        })
    }

    pub fn conseiller_summary(&self, conseiller_id: Option<&str>) -> Option<ConseillerSummary> {
        let c = self.conseillers.get(conseiller_id?)?;
        Some(ConseillerSummary {
            id: Some(c.id),
            nom: Some(c.nom),
            prenom: Some(c.prenom),
            email: c.email,
            statut: c.statut,
        })
    }

    pub fn joined_sinistre(&self, mut sinistre: Sinistre) -> Sinistre {
        sinistre.client = self.client_summary(&sinistre.client_id);
        sinistre
    }

    pub fn joined_contrat(&self, mut contrat: Contrat) -> Contrat {
        contrat.client = self.client_summary(&contrat.client_id);
        contrat
    }

    pub fn joined_escalade(&self, mut escalade: Escalade) -> Escalade {
        escalade.sinistre = self
            .sinistres
            .get(&escalade.sinistre_id)
            .map(|s| Box::new(self.joined_sinistre(s)));
        escalade.conseiller = self.conseiller_summary(escalade.conseiller_id.as_deref());
        escalade
    }

    pub fn joined_remboursement(&self, mut remboursement: Remboursement) -> Remboursement {
        remboursement.sinistre = self
            .sinistres
            .get(&remboursement.sinistre_id)
            .map(|s| Box::new(self.joined_sinistre(s)));
        remboursement
    }
}

fn seed_client(store: &Store, matricule: &str, nom: &str, prenom: &str, created: &str) -> Client {
    let id = new_id();
    let client = Client {
        id: id.clone(),
        matricule: matricule.to_string(),
        nom: nom.to_string(),
        prenom: prenom.to_string(),
        email: Some(format!("{}.{}@mail.example", prenom.to_lowercase(), nom.to_lowercase())),
        telephone: Some("0600000000".to_string()),
        adresse: None,
        civilite: None,
        date_naissance: None,
        ville: Some("Casablanca".to_string()),
        code_postal: None,
        statut: Some("actif".to_string()),
        date_creation: Some(created.to_string()),
    };
    store.matricules.insert(matricule_key(matricule), id.clone());
    store.clients.insert(id, client.clone());
    client
}

#[allow(clippy::too_many_arguments)]
fn seed_sinistre(
    store: &Store,
    client: &Client,
    numero: &str,
    kind: TypeSinistre,
    description: &str,
    cci: i64,
    status: StatusDossier,
    created: &str,
) -> Sinistre {
    let id = new_id();
    let sinistre = Sinistre {
        id: id.clone(),
        client_id: client.id.clone(),
        numero_sinistre: numero.to_string(),
        type_sinistre: kind,
        date_sinistre: Some(created[..10].to_string()),
        lieu_sinistre: Some("Casablanca".to_string()),
        description: Some(description.to_string()),
        cci_score: Some(cci),
        status_dossier: status,
        type_traitement: Some(TypeTraitement::Autonome),
        documents_complets: Some(false),
        tiers_implique: Some(false),
        tiers_nom: None,
        date_creation: Some(created.to_string()),
        client: None,
    };
    store.sinistres.insert(id, sinistre.clone());
    sinistre
}
