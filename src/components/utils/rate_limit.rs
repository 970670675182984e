//! Limitation du débit des actions des utilisateurs.
//!
//! Ces limites servent d'anti-spam et sont perdues au redémarrage.

use std::{
    collections::HashMap,
    num::NonZeroU32,
    sync::Mutex,
    time::{Duration, Instant},
};

use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota,
};

/// Au-delà de ce nombre d'entrées, les délais expirés sont purgés
const EVICTION_THRESHOLD: usize = 1000;

type Limiter = governor::RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

pub trait RateLimiter: Send + Sync {
    /// Retourne `true` et démarre une nouvelle fenêtre si aucune fenêtre n'est active pour `key`
    fn try_acquire(&self, key: &str, window: Duration) -> bool;
}

/// Une action par fenêtre pour une clé
struct Window {
    limiter: Limiter,
    period: Duration,
    last_acquired: Instant,
}

impl Window {
    fn new(period: Duration) -> Option<Self> {
        let quota = Quota::with_period(period)?.allow_burst(NonZeroU32::MIN);
        Some(Self {
            limiter: governor::RateLimiter::direct(quota),
            period,
            last_acquired: Instant::now(),
        })
    }
    fn expired(&self, now: Instant) -> bool {
        self.last_acquired + self.period <= now
    }
}

/// Limiteur en mémoire du processus, une fenêtre `governor` par clé
#[derive(Default)]
pub struct LocalRateLimiter {
    windows: Mutex<HashMap<String, Window>>,
}

impl std::fmt::Debug for LocalRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalRateLimiter")
            .field("keys", &self.len())
            .finish()
    }
}

impl LocalRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn len(&self) -> usize {
        self.windows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl RateLimiter for LocalRateLimiter {
    fn try_acquire(&self, key: &str, window: Duration) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        if windows.len() > EVICTION_THRESHOLD {
            windows.retain(|_, w| !w.expired(now));
        }
        if let Some(current) = windows.get_mut(key) {
            if current.period == window {
                if current.limiter.check().is_err() {
                    return false;
                }
                current.last_acquired = now;
                return true;
            }
            if !current.expired(now) {
                return false;
            }
        }
        // Une fenêtre nulle ne limite rien
        match Window::new(window) {
            Some(fresh) => {
                // Le premier jeton est consommé par l'action courante
                let _ = fresh.limiter.check();
                windows.insert(key.to_string(), fresh);
            }
            None => {
                windows.remove(key);
            }
        }
        true
    }
}
