//! Knowledge Base
//!
//! A small curated set of patient-facing condition notes, searched by
//! keyword overlap. Entries tagged `General` are visible from every
//! specialty.

use serde::Serialize;

use crate::specialty::Specialty;

/// One condition note
#[derive(Debug)]
pub struct KnowledgeEntry {
    pub id: &'static str,
    pub specialty: Specialty,
    pub title: &'static str,
    pub keywords: &'static [&'static str],
    pub content: &'static str,
}

/// A ranked search hit
#[derive(Clone, Debug, Serialize)]
pub struct Snippet {
    pub id: &'static str,
    pub title: &'static str,
    pub content: &'static str,

    /// Share of query terms found in the entry, 0.0-1.0
    pub score: f64,
}

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "do", "for", "from", "have", "has",
    "i", "in", "is", "it", "its", "me", "my", "of", "on", "or", "so", "that", "the", "this", "to",
    "was", "what", "when", "with", "why", "how", "can", "feel", "feeling", "got", "am",
];

/// Lowercase content words of `text`
pub fn terms(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.len() > 1 && !STOPWORDS.contains(&w.as_str()))
    {
        if !out.contains(&word) {
            out.push(word);
        }
    }
    out
}

impl KnowledgeEntry {
    fn visible_from(&self, specialty: Specialty) -> bool {
        self.specialty == specialty || self.specialty == Specialty::General
    }

    /// Fraction of `query_terms` matching this entry's keywords or title
    fn score(&self, query_terms: &[String]) -> f64 {
        if query_terms.is_empty() {
            return 0.0;
        }
        let vocabulary: Vec<String> = self
            .keywords
            .iter()
            .flat_map(|k| terms(k))
            .chain(terms(self.title))
            .collect();

        let hits = query_terms
            .iter()
            .filter(|t| vocabulary.iter().any(|v| v == *t || stem_eq(v, t)))
            .count();

        hits as f64 / query_terms.len() as f64
    }
}

/// Treat simple plural and -ing forms as the same word
fn stem_eq(a: &str, b: &str) -> bool {
    fn stem(w: &str) -> &str {
        w.strip_suffix("ing")
            .or_else(|| w.strip_suffix('s'))
            .filter(|s| s.len() >= 3)
            .unwrap_or(w)
    }
    stem(a) == stem(b)
}

/// Entries scoring at least `threshold`, best first, at most `limit`
pub fn search(query: &str, specialty: Specialty, threshold: f64, limit: usize) -> Vec<Snippet> {
    let query_terms = terms(query);

    let mut hits: Vec<Snippet> = ENTRIES
        .iter()
        .filter(|e| e.visible_from(specialty))
        .map(|e| Snippet {
            id: e.id,
            title: e.title,
            content: e.content,
            score: e.score(&query_terms),
        })
        .filter(|s| s.score > 0.0 && s.score >= threshold)
        .collect();

    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(b.id)));
    hits.truncate(limit);
    hits
}

pub const ENTRIES: &[KnowledgeEntry] = &[
    KnowledgeEntry {
        id: "gen-common-cold",
        specialty: Specialty::General,
        title: "Common cold",
        keywords: &["runny nose", "sneezing", "sore throat", "cough", "congestion", "mild fever"],
        content: "A viral infection of the nose and throat. Symptoms peak in 2-3 days and usually clear within 10 days. Rest, fluids and paracetamol help. See a doctor if fever lasts over 3 days or breathing becomes difficult.",
    },
    KnowledgeEntry {
        id: "gen-influenza",
        specialty: Specialty::General,
        title: "Influenza",
        keywords: &["high fever", "muscle aches", "chills", "fatigue", "cough", "headache", "flu"],
        content: "Flu starts suddenly with fever, aches and exhaustion. Most people recover in a week. People over 65, pregnant women and those with chronic illness should contact a doctor early, as antivirals work best within 48 hours.",
    },
    KnowledgeEntry {
        id: "gen-tension-headache",
        specialty: Specialty::General,
        title: "Tension headache",
        keywords: &["headache", "pressure", "band around head", "stress", "neck tension"],
        content: "The most common headache: a dull, pressing band around the head, often linked to stress, poor sleep or posture. Simple painkillers and rest help. A sudden, severe 'worst ever' headache needs emergency care.",
    },
    KnowledgeEntry {
        id: "gen-dehydration",
        specialty: Specialty::General,
        title: "Dehydration",
        keywords: &["thirst", "dark urine", "dizziness", "dry mouth", "vomiting", "diarrhea"],
        content: "Losing more fluid than you take in, often through vomiting, diarrhoea or heat. Sip water or oral rehydration solution. Seek care for confusion, no urine for 8 hours, or inability to keep fluids down.",
    },
    KnowledgeEntry {
        id: "card-acute-coronary",
        specialty: Specialty::Cardiology,
        title: "Heart attack (acute coronary syndrome)",
        keywords: &["chest pain", "chest pressure", "left arm pain", "jaw pain", "cold sweat", "shortness of breath", "nausea"],
        content: "Pressure or pain in the chest, often spreading to the arm, jaw or back, with sweating, nausea or breathlessness. This is an emergency: call emergency services immediately and do not drive yourself.",
    },
    KnowledgeEntry {
        id: "card-palpitations",
        specialty: Specialty::Cardiology,
        title: "Palpitations",
        keywords: &["palpitations", "racing heart", "skipped beats", "fluttering", "caffeine", "anxiety"],
        content: "A sense of a racing, pounding or irregular heartbeat. Often harmless and triggered by caffeine, stress or poor sleep. Seek urgent care if accompanied by chest pain, fainting or breathlessness.",
    },
    KnowledgeEntry {
        id: "card-hypertension",
        specialty: Specialty::Cardiology,
        title: "High blood pressure",
        keywords: &["blood pressure", "hypertension", "headache", "dizziness", "nosebleed"],
        content: "Usually causes no symptoms and is found on measurement. Readings above 180/120 with headache, chest pain or vision changes need urgent assessment. Otherwise arrange a routine check with your doctor.",
    },
    KnowledgeEntry {
        id: "derm-eczema",
        specialty: Specialty::Dermatology,
        title: "Eczema (atopic dermatitis)",
        keywords: &["itchy skin", "dry skin", "rash", "red patches", "flaky", "eczema"],
        content: "Dry, itchy, inflamed patches, often in skin creases. Moisturise several times a day, avoid soaps and known triggers. Mild hydrocortisone cream can help short term. See a doctor if the skin weeps, crusts or becomes painful.",
    },
    KnowledgeEntry {
        id: "derm-hives",
        specialty: Specialty::Dermatology,
        title: "Hives (urticaria)",
        keywords: &["hives", "welts", "itchy rash", "raised bumps", "allergy", "swelling"],
        content: "Raised, itchy welts that move around and fade within a day. Antihistamines usually help. Swelling of the lips, tongue or throat, or difficulty breathing, is an emergency.",
    },
    KnowledgeEntry {
        id: "peds-fever",
        specialty: Specialty::Pediatrics,
        title: "Fever in children",
        keywords: &["fever", "child", "baby", "temperature", "irritable", "teething"],
        content: "A temperature of 38°C or more. Babies under 3 months with a fever need to be seen urgently. In older children, watch drinking, alertness and rash. A rash that does not fade under a pressed glass is an emergency.",
    },
    KnowledgeEntry {
        id: "peds-croup",
        specialty: Specialty::Pediatrics,
        title: "Croup",
        keywords: &["barking cough", "hoarse voice", "stridor", "child", "night cough"],
        content: "A viral infection causing a barking cough and noisy breathing, worse at night, in children under 6. Keep the child calm and upright. Noisy breathing at rest or drawing in of the ribs needs urgent care.",
    },
    KnowledgeEntry {
        id: "gi-gastroenteritis",
        specialty: Specialty::Gastroenterology,
        title: "Gastroenteritis",
        keywords: &["diarrhea", "vomiting", "stomach cramps", "nausea", "stomach bug", "food poisoning", "abdominal pain"],
        content: "Infection of the gut causing diarrhoea and vomiting, usually clearing within a few days. Keep drinking small amounts often. Seek care for blood in stool, signs of dehydration, or symptoms lasting over a week.",
    },
    KnowledgeEntry {
        id: "gi-reflux",
        specialty: Specialty::Gastroenterology,
        title: "Acid reflux (GERD)",
        keywords: &["heartburn", "acid reflux", "burning chest", "sour taste", "indigestion", "bloating"],
        content: "Burning behind the breastbone after meals or when lying down. Smaller meals, avoiding late eating and antacids help. Trouble swallowing, weight loss or black stools need a doctor's review.",
    },
    KnowledgeEntry {
        id: "gi-appendicitis",
        specialty: Specialty::Gastroenterology,
        title: "Appendicitis",
        keywords: &["abdominal pain", "lower right abdomen", "pain around navel", "fever", "loss of appetite", "vomiting"],
        content: "Pain that starts around the navel and moves to the lower right abdomen, worsening over hours, often with fever and loss of appetite. Needs same-day medical assessment.",
    },
    KnowledgeEntry {
        id: "resp-asthma",
        specialty: Specialty::Respiratory,
        title: "Asthma flare",
        keywords: &["wheezing", "shortness of breath", "chest tightness", "cough", "inhaler", "asthma"],
        content: "Narrowing of the airways causing wheeze, cough and tight chest. Use the reliever inhaler as planned. If the inhaler is not helping, or speaking in full sentences is difficult, call emergency services.",
    },
    KnowledgeEntry {
        id: "resp-pneumonia",
        specialty: Specialty::Respiratory,
        title: "Pneumonia",
        keywords: &["cough", "fever", "phlegm", "chest pain when breathing", "shortness of breath", "chills"],
        content: "Lung infection with cough, fever and breathlessness, sometimes sharp chest pain on breathing in. Needs a doctor's assessment, especially for older adults, young children or anyone breathing fast.",
    },
];
