use std::sync::Arc;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use super::{LabelSet, Replacer};
use crate::detect::{Entity, canonical_label};
use crate::error::ShroudError;
use crate::store::EntityStore;
use crate::thread::ThreadId;

/// Locale governing the shape of generated pseudonyms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locale {
    De,
    En,
}

impl Locale {
    /// Accepts `de`, `de_DE`, `en`, `en_US` and the like; anything
    /// unrecognised is a configuration error.
    pub fn parse(raw: &str) -> Result<Self, ShroudError> {
        match raw.get(..2).map(str::to_ascii_lowercase).as_deref() {
            Some("de") => Ok(Locale::De),
            Some("en") => Ok(Locale::En),
            _ => Err(ShroudError::Configuration(format!(
                "unsupported pseudonym locale `{raw}`"
            ))),
        }
    }
}

/// Strategy that replaces entities with realistic synthetic values of the
/// same category.
///
/// The generator is seeded with `SHA-256(thread ‖ original)`, so a given
/// original maps to the same pseudonym across restarts within a thread,
/// distinct originals get distinct pseudonyms, and the mapping is
/// independent between threads.
pub struct PseudonymReplacer {
    store: Arc<dyn EntityStore>,
    labels: LabelSet,
    locale: Locale,
}

const SUPPORTED: &[&str] = &[
    "person",
    "email",
    "phone_number",
    "address",
    "iban",
    "credit_card_number",
    "location",
];

impl PseudonymReplacer {
    pub fn new(store: Arc<dyn EntityStore>, locale: Locale) -> Self {
        Self {
            store,
            labels: LabelSet::only(SUPPORTED),
            locale,
        }
    }

    fn rng_for(&self, entity: &Entity, thread: ThreadId) -> StdRng {
        let mut hasher = Sha256::new();
        hasher.update(thread.as_bytes());
        hasher.update(entity.text.as_bytes());
        let seed: [u8; 32] = hasher.finalize().into();
        StdRng::from_seed(seed)
    }
}

#[async_trait]
impl Replacer for PseudonymReplacer {
    fn entity_store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    fn supported_labels(&self) -> &LabelSet {
        &self.labels
    }

    async fn create_placeholder(
        &self,
        entity: &Entity,
        thread: ThreadId,
    ) -> Result<String, ShroudError> {
        let mut rng = self.rng_for(entity, thread);
        let value = match canonical_label(&entity.label).as_str() {
            "person" => person(&mut rng, self.locale),
            "email" => email(&mut rng),
            "phone_number" => phone_number(&mut rng, self.locale),
            "address" => address(&mut rng, self.locale),
            "iban" => iban(&mut rng, self.locale),
            "credit_card_number" => credit_card_number(&mut rng),
            "location" => city(&mut rng, self.locale).to_string(),
            other => return Err(ShroudError::UnsupportedEntity(other.to_string())),
        };
        Ok(value)
    }
}

const FIRST_NAMES_DE: &[&str] = &[
    "Lukas", "Leon", "Finn", "Jonas", "Paul", "Mia", "Emma", "Hannah", "Lena", "Anna", "Lea",
    "Marie", "Sophie", "Max", "Felix", "Jan", "Laura", "Julia", "Nina", "Tim",
];
const LAST_NAMES_DE: &[&str] = &[
    "Müller", "Schmidt", "Schneider", "Fischer", "Weber", "Meyer", "Wagner", "Becker", "Schulz",
    "Hoffmann", "Koch", "Bauer", "Richter", "Klein", "Wolf", "Neumann", "Schwarz", "Zimmermann",
];
const FIRST_NAMES_EN: &[&str] = &[
    "James", "Mary", "Robert", "Patricia", "John", "Jennifer", "Michael", "Linda", "David",
    "Elizabeth", "William", "Barbara", "Richard", "Susan", "Joseph", "Jessica", "Thomas", "Sarah",
];
const LAST_NAMES_EN: &[&str] = &[
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis", "Rodriguez",
    "Martinez", "Wilson", "Anderson", "Taylor", "Thomas", "Moore", "Jackson", "Martin", "Lee",
];
const CITIES_DE: &[&str] = &[
    "Berlin", "Hamburg", "München", "Köln", "Frankfurt", "Stuttgart", "Düsseldorf", "Leipzig",
    "Dortmund", "Essen", "Bremen", "Dresden", "Hannover", "Nürnberg",
];
const CITIES_EN: &[&str] = &[
    "London", "Manchester", "Birmingham", "Leeds", "Glasgow", "Liverpool", "Bristol", "Sheffield",
    "Edinburgh", "Cardiff", "Nottingham", "Newcastle",
];
const STREETS_DE: &[&str] = &[
    "Hauptstraße", "Bahnhofstraße", "Gartenstraße", "Schulstraße", "Lindenweg", "Bergstraße",
    "Kirchgasse", "Am Markt", "Ringstraße", "Waldweg",
];
const STREETS_EN: &[&str] = &[
    "High Street", "Station Road", "Church Lane", "Victoria Road", "Green Lane", "Park Avenue",
    "Queens Road", "King Street", "Mill Lane", "Broadway",
];
const EMAIL_DOMAINS: &[&str] = &[
    "example.com", "example.org", "mail.example", "post.example", "inbox.example",
];

fn pick<'a>(rng: &mut StdRng, pool: &'a [&'a str]) -> &'a str {
    pool[rng.gen_range(0..pool.len())]
}

fn digits(rng: &mut StdRng, count: usize) -> String {
    (0..count)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

fn person(rng: &mut StdRng, locale: Locale) -> String {
    match locale {
        Locale::De => format!(
            "{} {}",
            pick(rng, FIRST_NAMES_DE),
            pick(rng, LAST_NAMES_DE)
        ),
        Locale::En => format!(
            "{} {}",
            pick(rng, FIRST_NAMES_EN),
            pick(rng, LAST_NAMES_EN)
        ),
    }
}

fn email(rng: &mut StdRng) -> String {
    // ascii-only pools keep the local part valid without transliteration
    let first = pick(rng, FIRST_NAMES_EN).to_ascii_lowercase();
    let last = pick(rng, LAST_NAMES_EN).to_ascii_lowercase();
    format!("{}.{}@{}", first, last, pick(rng, EMAIL_DOMAINS))
}

fn phone_number(rng: &mut StdRng, locale: Locale) -> String {
    match locale {
        Locale::De => format!("+49 {} {}", digits(rng, 3), digits(rng, 7)),
        Locale::En => format!("+44 {} {}", digits(rng, 4), digits(rng, 6)),
    }
}

fn address(rng: &mut StdRng, locale: Locale) -> String {
    match locale {
        Locale::De => format!(
            "{} {}, {} {}",
            pick(rng, STREETS_DE),
            rng.gen_range(1..200),
            digits(rng, 5),
            pick(rng, CITIES_DE)
        ),
        Locale::En => format!(
            "{} {}, {}",
            rng.gen_range(1..200),
            pick(rng, STREETS_EN),
            pick(rng, CITIES_EN)
        ),
    }
}

fn iban(rng: &mut StdRng, locale: Locale) -> String {
    match locale {
        Locale::De => format!("DE{}{}", digits(rng, 2), digits(rng, 18)),
        Locale::En => format!("GB{}SHRD{}", digits(rng, 2), digits(rng, 14)),
    }
}

fn credit_card_number(rng: &mut StdRng) -> String {
    format!("4{}", digits(rng, 15))
}

fn city(rng: &mut StdRng, locale: Locale) -> &'static str {
    match locale {
        Locale::De => pick(rng, CITIES_DE),
        Locale::En => pick(rng, CITIES_EN),
    }
}
