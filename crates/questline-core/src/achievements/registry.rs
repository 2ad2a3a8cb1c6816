//! Achievement registry.
//!
//! The registry is read-only after construction. It comes either from the
//! built-in table or from a TOML rules file; a bad entry in the file is
//! reported and skipped without affecting its neighbours.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{AchievementCategory, AchievementDefinition, AchievementError, Condition, Rarity, Result};
use crate::events::EventType;

/// Fixed table of achievement definitions.
#[derive(Debug, Clone, Serialize)]
pub struct AchievementRegistry {
    definitions: Vec<AchievementDefinition>,
    #[serde(skip)]
    issues: Vec<AchievementError>,
}

impl AchievementRegistry {
    /// Build from definitions. Duplicate ids after the first are dropped.
    pub fn new(definitions: Vec<AchievementDefinition>) -> Self {
        let mut registry = Self {
            definitions: Vec::with_capacity(definitions.len()),
            issues: Vec::new(),
        };
        let mut seen = HashSet::new();
        for definition in definitions {
            if !seen.insert(definition.id.clone()) {
                registry
                    .issues
                    .push(AchievementError::DuplicateId(definition.id.clone()));
                continue;
            }
            if let Err(e) = definition.validate() {
                registry.issues.push(e);
            }
            registry.definitions.push(definition);
        }
        registry
    }

    /// The achievements shipped with the application.
    pub fn builtin() -> Self {
        Self::new(builtin_definitions())
    }

    /// Parse a rules file. Entries that fail to parse are skipped and
    /// recorded in [`issues`](Self::issues); only an unreadable document
    /// is an error.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let table: toml::Table =
            toml::from_str(content).map_err(|e| AchievementError::ParseError(e.to_string()))?;

        let entries = match table.get("achievements") {
            Some(toml::Value::Array(entries)) => entries.clone(),
            Some(_) => {
                return Err(AchievementError::ParseError(
                    "'achievements' must be an array of tables".to_string(),
                ))
            }
            None => Vec::new(),
        };

        let mut definitions = Vec::new();
        let mut parse_issues = Vec::new();
        for (index, entry) in entries.into_iter().enumerate() {
            match AchievementDefinition::deserialize(entry) {
                Ok(definition) => definitions.push(definition),
                Err(e) => {
                    tracing::warn!(index, error = %e, "skipping unparseable achievement definition");
                    parse_issues.push(AchievementError::UnparseableEntry {
                        index,
                        message: e.to_string(),
                    });
                }
            }
        }

        let mut registry = Self::new(definitions);
        parse_issues.append(&mut registry.issues);
        registry.issues = parse_issues;
        Ok(registry)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| AchievementError::ReadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        Self::from_toml_str(&content)
    }

    pub fn definitions(&self) -> &[AchievementDefinition] {
        &self.definitions
    }

    pub fn get(&self, id: &str) -> Option<&AchievementDefinition> {
        self.definitions.iter().find(|d| d.id == id)
    }

    /// Definitions whose trigger set includes `event_type`.
    pub fn triggered_by<'a, 'b>(
        &'a self,
        event_type: &'b EventType,
    ) -> impl Iterator<Item = &'a AchievementDefinition> + 'b
    where
        'a: 'b,
    {
        self.definitions
            .iter()
            .filter(move |d| d.listens_to(event_type))
    }

    /// Problems found while building the registry.
    pub fn issues(&self) -> &[AchievementError] {
        &self.issues
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl Default for AchievementRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[allow(clippy::too_many_arguments)]
fn def(
    id: &str,
    name: &str,
    description: &str,
    category: AchievementCategory,
    rarity: Rarity,
    xp_reward: u32,
    trigger: EventType,
    condition: Condition,
) -> AchievementDefinition {
    AchievementDefinition {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        category,
        rarity,
        xp_reward,
        triggers: vec![trigger],
        condition: Some(condition),
    }
}

const ARCHETYPES: [(&str, &str); 6] = [
    ("builder", "The Builder"),
    ("strategist", "The Strategist"),
    ("creator", "The Creator"),
    ("analyst", "The Analyst"),
    ("connector", "The Connector"),
    ("explorer", "The Explorer"),
];

fn builtin_definitions() -> Vec<AchievementDefinition> {
    use AchievementCategory::*;

    let mut defs = vec![
        def(
            "first_steps",
            "First Steps",
            "Complete your first quest",
            Onboarding,
            Rarity::Common,
            50,
            EventType::QUEST_COMPLETION,
            Condition::counter_at_least(1),
        ),
        def(
            "halfway_there",
            "Halfway There",
            "Complete four quests",
            Quest,
            Rarity::Uncommon,
            100,
            EventType::QUEST_COMPLETION,
            Condition::counter_at_least(4),
        ),
        def(
            "journey_complete",
            "Journey Complete",
            "Finish the final quest",
            Quest,
            Rarity::Legendary,
            500,
            EventType::QUEST_COMPLETION,
            Condition::context_equals(crate::events::QUEST_NUMBER_KEY, crate::quest::QUEST_COUNT),
        ),
        def(
            "self_discovery",
            "Self Discovery",
            "Finish the archetype quiz",
            Onboarding,
            Rarity::Common,
            25,
            EventType::ARCHETYPE_COMPLETE,
            Condition::counter_at_least(1),
        ),
        def(
            "first_hackathon",
            "Hacker Initiate",
            "Join your first hackathon",
            Community,
            Rarity::Common,
            50,
            EventType::HACKATHON_JOIN,
            Condition::counter_at_least(1),
        ),
        def(
            "hackathon_regular",
            "Hackathon Regular",
            "Join three hackathons",
            Community,
            Rarity::Rare,
            150,
            EventType::HACKATHON_JOIN,
            Condition::counter_at_least(3),
        ),
        def(
            "hackathon_legend",
            "Hackathon Legend",
            "Join ten hackathons",
            Community,
            Rarity::Epic,
            400,
            EventType::HACKATHON_JOIN,
            Condition::counter_at_least(10),
        ),
        def(
            "guild_member",
            "Guild Member",
            "Join your first guild",
            Community,
            Rarity::Common,
            50,
            EventType::GUILD_JOIN,
            Condition::counter_at_least(1),
        ),
        def(
            "guild_networker",
            "Networker",
            "Join three guilds",
            Community,
            Rarity::Uncommon,
            120,
            EventType::GUILD_JOIN,
            Condition::counter_at_least(3),
        ),
        def(
            "first_assessment",
            "Know Thyself",
            "Complete a skill assessment",
            Skills,
            Rarity::Common,
            40,
            EventType::SKILL_ASSESSMENT_COMPLETE,
            Condition::counter_at_least(1),
        ),
        def(
            "technical_specialist",
            "Technical Specialist",
            "Pass a technical skill assessment",
            Skills,
            Rarity::Rare,
            150,
            EventType::SKILL_ASSESSMENT_COMPLETE,
            Condition::all(vec![
                Condition::context_equals("category", "technical"),
                Condition::context_equals("passed", true),
            ]),
        ),
        def(
            "assessment_marathon",
            "Assessment Marathon",
            "Complete five skill assessments",
            Skills,
            Rarity::Epic,
            300,
            EventType::SKILL_ASSESSMENT_COMPLETE,
            Condition::counter_at_least(5),
        ),
    ];

    for (archetype, title) in ARCHETYPES {
        defs.push(def(
            &format!("archetype_{archetype}"),
            title,
            &format!("Discover you are {title}"),
            Archetype,
            Rarity::Rare,
            75,
            EventType::ARCHETYPE_COMPLETE,
            Condition::context_equals("archetype", archetype),
        ));
    }

    defs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_is_clean() {
        let registry = AchievementRegistry::builtin();
        assert!(registry.issues().is_empty(), "{:?}", registry.issues());
        assert_eq!(registry.len(), 18);
        assert!(registry.get("journey_complete").is_some());
        assert!(registry.get("archetype_builder").is_some());
    }

    #[test]
    fn triggered_by_filters_on_event_type() {
        let registry = AchievementRegistry::builtin();
        let hackathon: Vec<_> = registry
            .triggered_by(&EventType::HACKATHON_JOIN)
            .map(|d| d.id.as_str())
            .collect();
        assert_eq!(hackathon, ["first_hackathon", "hackathon_regular", "hackathon_legend"]);
        assert_eq!(registry.triggered_by(&EventType::new("unknown")).count(), 0);
    }

    #[test]
    fn duplicate_ids_keep_first() {
        let mut defs = builtin_definitions();
        let mut dup = defs[0].clone();
        dup.xp_reward = 9999;
        defs.push(dup);

        let registry = AchievementRegistry::new(defs);
        assert_eq!(registry.get("first_steps").unwrap().xp_reward, 50);
        assert_eq!(
            registry.issues(),
            &[AchievementError::DuplicateId("first_steps".to_string())]
        );
    }

    #[test]
    fn toml_loads_valid_and_skips_bad_entries() {
        let content = r#"
            [[achievements]]
            id = "pair_programmer"
            name = "Pair Programmer"
            category = "community"
            rarity = "uncommon"
            xp_reward = 80
            triggers = ["pairing_session"]
            condition = { kind = "counter_at_least", threshold = 2 }

            [[achievements]]
            id = "broken_kind"
            name = "Broken"
            category = "community"
            rarity = "common"
            xp_reward = 10
            triggers = ["pairing_session"]
            condition = { kind = "sometimes" }

            [[achievements]]
            id = "no_condition"
            name = "No Condition"
            category = "skills"
            rarity = "common"
            xp_reward = 10
            triggers = ["pairing_session"]
        "#;

        let registry = AchievementRegistry::from_toml_str(content).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.get("broken_kind").is_none());
        assert!(registry.get("no_condition").is_some());
        assert_eq!(registry.issues().len(), 2);
        assert!(matches!(
            registry.issues()[0],
            AchievementError::UnparseableEntry { index: 1, .. }
        ));
        assert!(matches!(
            registry.issues()[1],
            AchievementError::Malformed { .. }
        ));
    }

    #[test]
    fn toml_without_achievements_is_empty() {
        let registry = AchievementRegistry::from_toml_str("# nothing here\n").unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn toml_syntax_error_is_fatal() {
        assert!(AchievementRegistry::from_toml_str("[[achievements").is_err());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("achievements.toml");
        std::fs::write(
            &path,
            r#"
            [[achievements]]
            id = "early_bird"
            name = "Early Bird"
            category = "onboarding"
            rarity = "common"
            xp_reward = 5
            triggers = ["login"]
            condition = { kind = "counter_at_least", threshold = 1 }
            "#,
        )
        .unwrap();

        let registry = AchievementRegistry::load(&path).unwrap();
        assert_eq!(registry.len(), 1);

        let missing = AchievementRegistry::load(&dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(AchievementError::ReadFailed { .. })));
    }
}
