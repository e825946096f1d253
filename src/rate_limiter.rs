//! Limitador de peticiones por IP con tres ventanas (minuto, hora, día).
//!
//! El estado vive en memoria del proceso: no se comparte entre instancias y
//! dos peticiones concurrentes de la misma IP se serializan en el `Mutex`.
//! Para escalar horizontalmente habría que sustituir `RateLimiter` por un
//! almacén externo; los handlers sólo dependen de `check`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use tracing::{debug, warn};

pub const MINUTE: Duration = Duration::from_secs(60);
pub const HOUR: Duration = Duration::from_secs(60 * 60);
pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Cada cuánto se purgan las entradas caducadas.
pub const PURGE_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub per_minute: u32,
    pub per_hour: u32,
    pub per_day: u32,
    /// Si es `true`, superar el límite diario sólo genera un aviso.
    pub daily_limit_is_soft: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: 10,
            per_hour: 50,
            per_day: 200,
            daily_limit_is_soft: false,
        }
    }
}

/// Ventanas, ordenadas de la más estricta a la más amplia.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RateLimitWindow {
    Minute,
    Hour,
    Day,
}

impl RateLimitWindow {
    pub const ALL: [RateLimitWindow; 3] = [Self::Minute, Self::Hour, Self::Day];

    pub fn duration(&self) -> Duration {
        match self {
            Self::Minute => MINUTE,
            Self::Hour => HOUR,
            Self::Day => DAY,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
        }
    }

    fn index(&self) -> usize {
        match self {
            Self::Minute => 0,
            Self::Hour => 1,
            Self::Day => 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed {
        /// Peticiones restantes en la ventana más estricta (minuto u hora).
        remaining: u32,
        /// Presente cuando se ha superado el límite diario en modo blando.
        warning: Option<String>,
    },
    Rejected {
        window: RateLimitWindow,
        retry_after: Duration,
    },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    /// Segundos a esperar, redondeados hacia arriba (mínimo 1).
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::Rejected { retry_after, .. } => Some(ceil_secs(*retry_after)),
            Self::Allowed { .. } => None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct WindowCounter {
    count: u32,
    started_at: Instant,
}

impl WindowCounter {
    fn fresh(now: Instant) -> Self {
        Self {
            count: 0,
            started_at: now,
        }
    }

    fn expired(&self, window: RateLimitWindow, now: Instant) -> bool {
        now.saturating_duration_since(self.started_at) >= window.duration()
    }

    fn remaining_time(&self, window: RateLimitWindow, now: Instant) -> Duration {
        window
            .duration()
            .saturating_sub(now.saturating_duration_since(self.started_at))
    }
}

/// Contadores de una IP para las tres ventanas.
#[derive(Clone, Debug)]
struct RateLimitEntry {
    windows: [WindowCounter; 3],
}

impl RateLimitEntry {
    fn new(now: Instant) -> Self {
        Self {
            windows: [WindowCounter::fresh(now); 3],
        }
    }

    fn fully_expired(&self, now: Instant) -> bool {
        RateLimitWindow::ALL
            .iter()
            .all(|w| self.windows[w.index()].expired(*w, now))
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    entries: Arc<Mutex<HashMap<String, RateLimitEntry>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn limit(&self, window: RateLimitWindow) -> u32 {
        match window {
            RateLimitWindow::Minute => self.config.per_minute,
            RateLimitWindow::Hour => self.config.per_hour,
            RateLimitWindow::Day => self.config.per_day,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RateLimitEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn check(&self, ip: &str) -> RateLimitDecision {
        self.check_at(ip, Instant::now())
    }

    /// Evalúa una petición de `ip` en el instante `now`.
    ///
    /// Las ventanas caducadas se reinician antes de evaluar. Si alguna ventana
    /// ya está llena se rechaza nombrando la más estricta, sin consumir cupo;
    /// en otro caso se incrementan las tres.
    pub fn check_at(&self, ip: &str, now: Instant) -> RateLimitDecision {
        let mut entries = self.lock();
        let entry = entries
            .entry(ip.to_string())
            .or_insert_with(|| RateLimitEntry::new(now));

        for window in RateLimitWindow::ALL {
            let counter = &mut entry.windows[window.index()];
            if counter.expired(window, now) {
                *counter = WindowCounter::fresh(now);
            }
        }

        let mut daily_overflow = false;
        for window in RateLimitWindow::ALL {
            let counter = &entry.windows[window.index()];
            if counter.count < self.limit(window) {
                continue;
            }
            if window == RateLimitWindow::Day && self.config.daily_limit_is_soft {
                daily_overflow = true;
                continue;
            }
            debug!(
                "Límite por {} alcanzado para {}",
                window.name(),
                truncate_ip(ip)
            );
            return RateLimitDecision::Rejected {
                window,
                retry_after: counter.remaining_time(window, now),
            };
        }

        for counter in entry.windows.iter_mut() {
            counter.count = counter.count.saturating_add(1);
        }

        let remaining = [RateLimitWindow::Minute, RateLimitWindow::Hour]
            .iter()
            .map(|w| {
                self.limit(*w)
                    .saturating_sub(entry.windows[w.index()].count)
            })
            .min()
            .unwrap_or(0);

        let warning = if daily_overflow {
            warn!("Límite diario superado para la IP {}...", truncate_ip(ip));
            Some("Daily limit reached. Responses may be slower.".to_string())
        } else {
            None
        };

        RateLimitDecision::Allowed { remaining, warning }
    }

    pub fn reset(&self, ip: &str) {
        self.lock().remove(ip);
    }

    pub fn reset_all(&self) {
        self.lock().clear();
    }

    /// Elimina las IPs cuyas tres ventanas han caducado. Devuelve cuántas se borraron.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.fully_expired(now));
        before - entries.len()
    }

    pub fn tracked_ips(&self) -> usize {
        self.lock().len()
    }

    /// Lanza la tarea de limpieza periódica en el runtime actual.
    pub fn spawn_purge_task(&self) -> tokio::task::JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PURGE_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let purged = limiter.purge_expired(Instant::now());
                if purged > 0 {
                    debug!("Purgadas {purged} entradas de rate limit caducadas");
                }
            }
        })
    }
}

/// Extrae la IP del cliente respetando los proxies/CDN habituales.
///
/// Orden: `cf-connecting-ip`, primera IP de `x-forwarded-for`, `x-real-ip`,
/// primera IP de `x-vercel-forwarded-for` y, por último, la dirección del socket.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    let first_in_list = |value: &str| {
        value
            .split(',')
            .next()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    if let Some(ip) = header("cf-connecting-ip") {
        return ip.to_string();
    }
    if let Some(ip) = header("x-forwarded-for").and_then(first_in_list) {
        return ip;
    }
    if let Some(ip) = header("x-real-ip") {
        return ip.to_string();
    }
    if let Some(ip) = header("x-vercel-forwarded-for").and_then(first_in_list) {
        return ip;
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn truncate_ip(ip: &str) -> String {
    ip.chars().take(8).collect()
}

fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    secs.max(1)
}
