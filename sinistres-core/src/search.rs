//! Free-text filtering of the resource lists shown on the advisor screens.

use crate::models::{Client, Contrat, Escalade, Remboursement, Sinistre};

/// A record that can be matched against a search term.
pub trait Searchable {
    /// The fixed set of fields the term is matched against. Absent fields never match.
    fn search_fields(&self) -> Vec<Option<&str>>;

    fn matches(&self, term: &str) -> bool {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.search_fields()
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(&needle))
    }
}

/// Case-insensitive substring filter, keeping input order.
pub fn filter<'a, T: Searchable>(items: &'a [T], term: &str) -> Vec<&'a T> {
    items.iter().filter(|item| item.matches(term)).collect()
}

impl Searchable for Client {
    fn search_fields(&self) -> Vec<Option<&str>> {
        vec![
            Some(self.matricule.as_str()),
            Some(self.nom.as_str()),
            Some(self.prenom.as_str()),
        ]
    }
}

impl Searchable for Contrat {
    fn search_fields(&self) -> Vec<Option<&str>> {
        let client = self.client.as_ref();
        vec![
            Some(self.numero_contrat.as_str()),
            client.and_then(|c| c.nom.as_deref()),
            client.and_then(|c| c.prenom.as_deref()),
        ]
    }
}

impl Searchable for Sinistre {
    fn search_fields(&self) -> Vec<Option<&str>> {
        let client = self.client.as_ref();
        vec![
            Some(self.numero_sinistre.as_str()),
            client.and_then(|c| c.nom.as_deref()),
            client.and_then(|c| c.prenom.as_deref()),
            Some(self.type_sinistre.as_str()),
        ]
    }
}

impl Searchable for Escalade {
    fn search_fields(&self) -> Vec<Option<&str>> {
        let sinistre = self.sinistre.as_deref();
        vec![
            sinistre.map(|s| s.numero_sinistre.as_str()),
            sinistre
                .and_then(|s| s.client.as_ref())
                .and_then(|c| c.nom.as_deref()),
            Some(self.status.as_str()),
        ]
    }
}

impl Searchable for Remboursement {
    fn search_fields(&self) -> Vec<Option<&str>> {
        let sinistre = self.sinistre.as_deref();
        vec![
            sinistre.map(|s| s.numero_sinistre.as_str()),
            sinistre
                .and_then(|s| s.client.as_ref())
                .and_then(|c| c.nom.as_deref()),
            Some(self.status.as_str()),
        ]
    }
}
