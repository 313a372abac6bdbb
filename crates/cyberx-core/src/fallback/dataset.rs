use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One curated intelligence entry used when extraction degrades
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockIntel {
    pub actor_name: String,
    pub nexus: String,
    pub summary: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub timeline: String,
}

/// One canned answer to a frequently asked analyst question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredefinedAnswer {
    pub question: String,
    /// Every keyword must appear as a token of the query for a loose match
    #[serde(default)]
    pub keywords: Vec<String>,
    pub answer: String,
}

/// Complete set of deterministic substitute data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackDataset {
    #[serde(default)]
    pub records: Vec<MockIntel>,
    #[serde(default)]
    pub answers: Vec<PredefinedAnswer>,
}

impl FallbackDataset {
    /// Load a dataset from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let dataset: FallbackDataset = serde_json::from_str(&contents)?;
        dataset.validate()?;
        Ok(dataset)
    }

    fn validate(&self) -> Result<()> {
        for (idx, record) in self.records.iter().enumerate() {
            if record.actor_name.trim().is_empty()
                || record.nexus.trim().is_empty()
                || record.summary.trim().is_empty()
            {
                return Err(Error::ConfigError(format!(
                    "fallback record {} must have actor_name, nexus and summary",
                    idx
                )));
            }
        }
        for answer in &self.answers {
            if answer.question.trim().is_empty() || answer.answer.trim().is_empty() {
                return Err(Error::ConfigError(
                    "fallback answers need a question and an answer".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Curated 2025 threat actors and the canned B&A answers
    pub fn builtin() -> Self {
        Self {
            records: vec![
                mock(
                    "Earth Lamia",
                    "China",
                    "RCE exploitation against internet-facing servers worldwide.",
                    &["China-nexus"],
                    &["rce-exploitation", "global-servers"],
                    "Dec 2025",
                ),
                mock(
                    "Jackpot Panda",
                    "China",
                    "Crypto-mining operations abusing exposed web infrastructure.",
                    &["China-nexus"],
                    &["crypto-mining", "web-infrastructure"],
                    "Dec 2025",
                ),
                mock(
                    "STAC6565",
                    "Unknown",
                    "Ransomware deployment (QWCrypt) against Canadian organizations.",
                    &["Gold Blade"],
                    &["ransomware", "canada"],
                    "Dec 2025",
                ),
                mock(
                    "VolkLocker",
                    "Unknown",
                    "Cross-platform ransomware hitting Windows and Linux hosts.",
                    &[],
                    &["ransomware", "windows", "linux"],
                    "Dec 2025",
                ),
                mock(
                    "PassiveNeuron",
                    "Unknown",
                    "Espionage campaign deploying the Neursite backdoor globally.",
                    &["APT"],
                    &["espionage", "neursite"],
                    "Oct 2025",
                ),
                mock(
                    "APT31",
                    "China",
                    "Stealthy attacks on Russian IT firms using CloudyLoader.",
                    &["Judgement Panda"],
                    &["espionage", "cloudyloader", "russian-it"],
                    "Nov 2025",
                ),
                mock(
                    "Storm-0249",
                    "Unknown",
                    "ClickFix lures escalating into ransomware intrusions across sectors.",
                    &[],
                    &["clickfix", "ransomware"],
                    "Dec 2025",
                ),
                mock(
                    "SideWinder",
                    "India",
                    "Phishing against maritime and nuclear organizations.",
                    &["APT-C-17"],
                    &["phishing", "maritime", "nuclear"],
                    "Mar 2025",
                ),
                mock(
                    "Blind Eagle",
                    "Colombia",
                    "RAT delivery through phishing against Colombian targets.",
                    &["APT-C-36"],
                    &["rats", "phishing", "colombia"],
                    "Aug 2025",
                ),
                mock(
                    "Charon",
                    "Unknown",
                    "Ransomware operation hitting the Middle East.",
                    &[],
                    &["ransomware", "middle-east"],
                    "Aug 2025",
                ),
                mock(
                    "Storm-2603",
                    "China",
                    "LockBit ransomware deployments across multiple sectors.",
                    &[],
                    &["lockbit", "ransomware"],
                    "Oct 2025",
                ),
                mock(
                    "GrayBravo",
                    "Unknown",
                    "CastleLoader malware-as-a-service across multiple sectors.",
                    &["TAG-150"],
                    &["castleloader", "loader"],
                    "Dec 2025",
                ),
                mock(
                    "Warp Panda",
                    "China",
                    "BRICKSTORM backdoor deployed against government networks.",
                    &["BRICKSTORM"],
                    &["backdoor", "government"],
                    "Dec 2025",
                ),
                mock(
                    "APT41",
                    "China",
                    "Phishing campaigns targeting US officials.",
                    &["Brass Typhoon"],
                    &["phishing", "us-officials"],
                    "2025",
                ),
                mock(
                    "Aquatic Panda",
                    "China",
                    "Long-running global espionage operations.",
                    &[],
                    &["espionage"],
                    "2025",
                ),
            ],
            answers: vec![
                PredefinedAnswer {
                    question: "Which threat actors are China-nexus?".to_string(),
                    keywords: vec!["china".to_string(), "nexus".to_string()],
                    answer: "Numerous threat actors are linked to China, generally categorized as China-nexus due to their alignment with the strategic intelligence-gathering interests of the People's Republic of China (PRC). In 2025, China-nexus actors include Earth Lamia, Jackpot Panda, APT31, APT41, Warp Panda, and others using advanced exploitation.".to_string(),
                },
                PredefinedAnswer {
                    question: "What are the most active ransomware groups in 2025?".to_string(),
                    keywords: vec!["ransomware".to_string(), "active".to_string()],
                    answer: "Active ransomware in 2025: STAC6565 (QWCrypt), VolkLocker, Charon, Storm-0249, LockBit variants.".to_string(),
                },
                PredefinedAnswer {
                    question: "Recent activities of Medusa?".to_string(),
                    keywords: vec!["medusa".to_string()],
                    answer: "Medusa refers to two prominent entities: a highly active ransomware group and a major submarine cable project. The Medusa ransomware (operated by affiliates like Spearwing) has seen a surge in activity in 2025, targeting critical sectors with double extortion, while the Medusa Submarine Cable System is actively laying new digital infrastructure in the Mediterranean during late 2025.".to_string(),
                },
                PredefinedAnswer {
                    question: "Recent activities of APT31?".to_string(),
                    keywords: vec!["apt31".to_string()],
                    answer: "APT31, a China-linked cyber espionage group, has recently been active in campaigns targeting the Russian IT sector and the Czech Ministry of Foreign Affairs, utilizing a diverse and evolving set of tools to maintain stealth and persistence. APT31 launched stealthy attacks on Russian IT firms in Nov 2025 using CloudyLoader.".to_string(),
                },
            ],
        }
    }
}

fn mock(
    actor_name: &str,
    nexus: &str,
    summary: &str,
    aliases: &[&str],
    tags: &[&str],
    timeline: &str,
) -> MockIntel {
    MockIntel {
        actor_name: actor_name.to_string(),
        nexus: nexus.to_string(),
        summary: summary.to_string(),
        aliases: aliases.iter().map(|s| s.to_string()).collect(),
        tags: tags.iter().map(|s| s.to_string()).collect(),
        timeline: timeline.to_string(),
    }
}
