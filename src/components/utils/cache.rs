//! Cache mémoire à durée de vie limitée.
//!
//! Les entrées sont indexées par un couple (portée, catégorie), la portée étant en général
//! l'identifiant d'un serveur. Le cache n'est jamais la source de vérité: une entrée absente
//! ou expirée doit être relue depuis la base.

use std::{collections::HashMap, time::Duration};
use tokio::{sync::RwLock, time::Instant};

type Key = (u64, &'static str);

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

#[derive(Debug)]
struct State<V> {
    entries: HashMap<Key, Entry<V>>,
    /// Incrémentée à chaque invalidation d'une portée
    generations: HashMap<u64, u64>,
}

#[derive(Debug)]
pub struct TtlCache<V> {
    ttl: Duration,
    state: RwLock<State<V>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: RwLock::new(State { entries: HashMap::new(), generations: HashMap::new() }),
        }
    }

    /// Retourne la valeur si elle existe et n'a pas expiré
    pub async fn get(&self, scope: u64, category: &'static str) -> Option<V> {
        let state = self.state.read().await;
        match state.entries.get(&(scope, category)) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            _ => None,
        }
    }

    /// Génération courante d'une portée, à lire avant de consulter la source
    pub async fn generation(&self, scope: u64) -> u64 {
        self.state.read().await.generations.get(&scope).copied().unwrap_or(0)
    }

    /// Insère la valeur seulement si la portée n'a pas été invalidée depuis `generation`.
    ///
    /// Une lecture commencée avant une modification ne peut donc pas remettre en cache
    /// l'ancienne valeur.
    pub async fn insert_if_current(&self, scope: u64, category: &'static str, value: V, generation: u64) -> bool {
        let mut state = self.state.write().await;
        if state.generations.get(&scope).copied().unwrap_or(0) != generation {
            return false;
        }
        Self::store(&mut state, self.ttl, scope, category, value);
        true
    }

    fn store(state: &mut State<V>, ttl: Duration, scope: u64, category: &'static str, value: V) {
        let now = Instant::now();
        state.entries.retain(|_, e| e.expires_at > now);
        state.entries.insert((scope, category), Entry { value, expires_at: now + ttl });
    }

    /// Invalide une catégorie d'une portée, ou toute la portée si `category` vaut `None`
    pub async fn invalidate(&self, scope: u64, category: Option<&'static str>) {
        let mut state = self.state.write().await;
        *state.generations.entry(scope).or_insert(0) += 1;
        match category {
            Some(category) => {
                state.entries.remove(&(scope, category));
            }
            None => state.entries.retain(|(s, _), _| *s != scope),
        }
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }
}
