//! Risk Scoring Tool
//!
//! Rule-based triage. Each matched warning sign adds its weight once;
//! severity, onset and age adjust the total; certain sign combinations force
//! an emergency regardless of the score. Same input, same output.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use agent_core::tool::{string_arg, string_list_arg, u64_arg, ParameterSchema, ToolArgs, ToolSchema};
use agent_core::{Result as CoreResult, RiskLevel, Tool, ToolGroup};

use crate::error::AdvisorError;
use crate::specialty::Specialty;

/// A warning sign: any alias found in a symptom counts
struct Signal {
    label: &'static str,
    aliases: &'static [&'static str],
    weight: u32,
}

const fn signal(label: &'static str, aliases: &'static [&'static str], weight: u32) -> Signal {
    Signal { label, aliases, weight }
}

const SIGNALS: &[Signal] = &[
    signal("chest pain", &["chest pain", "chest pressure", "chest tightness", "crushing chest"], 35),
    signal("shortness of breath", &["shortness of breath", "difficulty breathing", "can't breathe", "breathless"], 30),
    signal("cold sweat", &["cold sweat", "clammy", "sweating"], 25),
    signal("loss of consciousness", &["fainting", "fainted", "passed out", "loss of consciousness", "unconscious"], 35),
    signal("confusion", &["confusion", "confused", "disoriented"], 25),
    signal("slurred speech", &["slurred speech", "trouble speaking"], 40),
    signal("facial droop", &["facial droop", "face drooping", "drooping face"], 40),
    signal("one-sided weakness", &["weakness on one side", "one-sided weakness", "numb arm", "arm weakness"], 40),
    signal("seizure", &["seizure", "convulsion", "fitting"], 40),
    signal("coughing blood", &["coughing blood", "coughing up blood", "blood in sputum"], 35),
    signal("vomiting blood", &["vomiting blood", "blood in vomit"], 35),
    signal("black stool", &["black stool", "tarry stool", "blood in stool"], 25),
    signal("severe headache", &["severe headache", "worst headache", "thunderclap"], 30),
    signal("stiff neck", &["stiff neck", "neck stiffness"], 25),
    signal("non-blanching rash", &["rash that does not fade", "non-blanching", "purple spots"], 35),
    signal("throat swelling", &["throat swelling", "swollen throat", "swollen tongue", "lip swelling"], 35),
    signal("high fever", &["high fever", "fever over 39", "fever above 39"], 20),
    signal("fever", &["fever", "temperature"], 10),
    signal("palpitations", &["palpitations", "racing heart", "irregular heartbeat"], 15),
    signal("vomiting", &["vomiting", "throwing up"], 10),
    signal("abdominal pain", &["abdominal pain", "stomach pain", "belly pain"], 10),
    signal("dizziness", &["dizziness", "dizzy", "lightheaded"], 10),
    signal("cough", &["cough"], 5),
    signal("headache", &["headache"], 5),
    signal("rash", &["rash", "hives"], 5),
];

/// Signals that weigh more in a given specialty
fn specialty_signals(specialty: Specialty) -> &'static [Signal] {
    const CARDIOLOGY: &[Signal] = &[
        signal("pain radiating to arm or jaw", &["left arm", "radiating", "jaw pain"], 25),
        signal("exertional symptoms", &["on exertion", "when climbing", "walking uphill"], 10),
    ];
    const PEDIATRICS: &[Signal] = &[
        signal("lethargy", &["lethargic", "floppy", "hard to wake"], 35),
        signal("poor feeding", &["not feeding", "refusing feeds", "no wet nappies", "no wet diapers"], 25),
    ];
    const RESPIRATORY: &[Signal] = &[
        signal("blue lips", &["blue lips", "bluish lips", "cyanosis"], 45),
        signal("wheezing", &["wheezing", "wheeze"], 15),
    ];
    const GASTRO: &[Signal] = &[
        signal("rigid abdomen", &["rigid abdomen", "board-like"], 40),
        signal("lower right pain", &["lower right"], 15),
    ];
    const DERMATOLOGY: &[Signal] = &[
        signal("blistering rash", &["blistering", "skin peeling"], 30),
        signal("spreading redness", &["spreading redness", "red streak"], 20),
    ];

    match specialty {
        Specialty::General => &[],
        Specialty::Cardiology => CARDIOLOGY,
        Specialty::Pediatrics => PEDIATRICS,
        Specialty::Respiratory => RESPIRATORY,
        Specialty::Gastroenterology => GASTRO,
        Specialty::Dermatology => DERMATOLOGY,
    }
}

/// Sign pairs that are an emergency on their own
const EMERGENCY_COMBINATIONS: &[(&str, &str)] = &[
    ("chest pain", "cold sweat"),
    ("chest pain", "shortness of breath"),
    ("chest pain", "loss of consciousness"),
    ("facial droop", "slurred speech"),
    ("one-sided weakness", "slurred speech"),
    ("severe headache", "stiff neck"),
    ("fever", "stiff neck"),
    ("fever", "non-blanching rash"),
    ("throat swelling", "shortness of breath"),
];

const EMERGENCY_FLOOR: u32 = 90;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    pub score: u32,
    pub matched_signals: Vec<String>,
    pub recommendations: Vec<String>,
    pub reasoning: String,
}

/// Tool scoring symptom urgency
pub struct RiskScorerTool {
    specialty: Specialty,
}

impl RiskScorerTool {
    pub fn new(specialty: Specialty) -> Self {
        Self { specialty }
    }
}

#[async_trait]
impl Tool for RiskScorerTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "risk_scoring".into(),
            description: "Score the urgency of the reported symptoms. Returns riskLevel (low, medium, high, emergency), a 0-100 score, matched warning signs and recommendations.".into(),
            parameters: vec![
                ParameterSchema::required("symptoms", "array", "Reported symptoms, e.g. [\"severe chest pain\", \"cold sweat\"]"),
                ParameterSchema::optional("duration", "string", "How long the symptoms have lasted, e.g. '20 minutes'"),
                ParameterSchema::optional("severity", "string", "Patient-rated severity")
                    .with_enum(vec!["mild".into(), "moderate".into(), "severe".into()]),
                ParameterSchema::optional("age", "number", "Patient age in years"),
                ParameterSchema::optional("specialty", "string", "Domain whose extra warning signs apply"),
            ],
            group: ToolGroup::Risk,
        }
    }

    async fn execute(&self, args: &ToolArgs) -> CoreResult<Value> {
        let symptoms = string_list_arg(args, "symptoms");
        if symptoms.is_empty() {
            return Err(AdvisorError::InvalidArgument("symptoms must list at least one symptom".into()).into());
        }
        let specialty = string_arg(args, "specialty").map_or(self.specialty, Specialty::from_tag);

        let assessment = assess(
            &symptoms,
            string_arg(args, "duration"),
            string_arg(args, "severity"),
            u64_arg(args, "age"),
            specialty,
        );

        tracing::debug!(
            score = assessment.score,
            level = %assessment.risk_level,
            signals = assessment.matched_signals.len(),
            "Risk scored"
        );

        Ok(serde_json::to_value(assessment)?)
    }
}

/// Score a symptom set
pub fn assess(
    symptoms: &[String],
    duration: Option<&str>,
    severity: Option<&str>,
    age: Option<u64>,
    specialty: Specialty,
) -> RiskAssessment {
    let text: Vec<String> = symptoms.iter().map(|s| s.to_lowercase()).collect();
    let mut reasons = Vec::new();

    let mut matched: Vec<&Signal> = Vec::new();
    for sig in SIGNALS.iter().chain(specialty_signals(specialty)) {
        if sig.aliases.iter().any(|a| text.iter().any(|t| t.contains(a))) {
            matched.push(sig);
        }
    }
    // "high fever" already covers "fever".
    if matched.iter().any(|s| s.label == "high fever") {
        matched.retain(|s| s.label != "fever");
    }

    let mut score: u32 = matched.iter().map(|s| s.weight).sum();
    let peak = matched.iter().map(|s| s.weight).max().unwrap_or(0);

    let severe = severity.is_some_and(|s| s.eq_ignore_ascii_case("severe"))
        || text.iter().any(|t| t.contains("severe") || t.contains("unbearable"));
    if severe {
        score += 15;
        reasons.push("described as severe (+15)".to_string());
    } else if severity.is_some_and(|s| s.eq_ignore_ascii_case("mild")) {
        score = score.saturating_sub(5);
        reasons.push("described as mild (-5)".to_string());
    }

    if let Some(d) = duration.map(str::to_lowercase) {
        if (d.contains("minute") || d.contains("hour") || d.contains("sudden")) && peak >= 25 {
            score += 10;
            reasons.push("sudden onset of a serious sign (+10)".to_string());
        } else if d.contains("week") || d.contains("month") {
            score += 5;
            reasons.push("persisting for weeks (+5)".to_string());
        }
    }

    if let Some(age) = age {
        if age < 2 || age >= 75 {
            score += 10;
            reasons.push(format!("age {age} is higher risk (+10)"));
        }
    }

    let combination = EMERGENCY_COMBINATIONS.iter().find(|(a, b)| {
        matched.iter().any(|s| s.label == *a) && matched.iter().any(|s| s.label == *b)
    });
    if let Some((a, b)) = combination {
        score = score.max(EMERGENCY_FLOOR);
        reasons.push(format!("{a} with {b} is an emergency combination"));
    }

    let score = score.min(100);
    let risk_level = if combination.is_some() || score >= 80 {
        RiskLevel::Emergency
    } else if score >= 50 {
        RiskLevel::High
    } else if score >= 25 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    let matched_signals: Vec<String> = matched.iter().map(|s| s.label.to_string()).collect();
    let mut reasoning = if matched_signals.is_empty() {
        "No warning signs matched".to_string()
    } else {
        format!(
            "Matched {}",
            matched.iter().map(|s| format!("{} (+{})", s.label, s.weight)).collect::<Vec<_>>().join(", ")
        )
    };
    for reason in &reasons {
        reasoning.push_str("; ");
        reasoning.push_str(reason);
    }
    reasoning.push_str(&format!(". Score {score}/100 → {risk_level}."));

    RiskAssessment {
        risk_level,
        score,
        matched_signals,
        recommendations: recommendations(risk_level),
        reasoning,
    }
}

fn recommendations(level: RiskLevel) -> Vec<String> {
    let items: &[&str] = match level {
        RiskLevel::Emergency => &[
            "Call emergency services now",
            "Do not drive yourself to hospital",
            "Stay with someone until help arrives",
        ],
        RiskLevel::High => &[
            "Seek medical care today (urgent care or same-day appointment)",
            "Call emergency services if symptoms get worse",
        ],
        RiskLevel::Medium => &[
            "Book an appointment with your doctor within a few days",
            "Seek care sooner if new warning signs appear",
        ],
        RiskLevel::Low => &[
            "Self-care at home is usually enough",
            "See a doctor if symptoms last longer than expected or worsen",
        ],
    };
    items.iter().map(|s| (*s).to_string()).collect()
}
