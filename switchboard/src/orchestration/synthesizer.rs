//! Response composition
//!
//! Joins handler outcomes into the one response a turn returns. A
//! clarification from any handler wins over every answer of the same turn.

use super::ComposedResponse;
use crate::agents::HandlerOutcome;
use crate::capabilities::CapabilityRegistry;

/// Compose the response of one turn from its outcomes, in dispatch order
pub fn compose(outcomes: &[HandlerOutcome], registry: &CapabilityRegistry) -> ComposedResponse {
    if let Some(clarifying) = outcomes.iter().find(|o| o.needs_clarification) {
        let prompt = clarifying
            .clarification_prompt
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| "Could you be more specific?".to_string());
        return ComposedResponse::clarification(prompt);
    }

    match outcomes {
        [] => ComposedResponse::answer("None of the selected capabilities produced an answer."),
        [single] => ComposedResponse::answer(single.answer.clone()),
        many => {
            let sections: Vec<String> = many
                .iter()
                .map(|outcome| {
                    let title = registry
                        .get(&outcome.capability_name)
                        .map(|d| d.domain.title())
                        .unwrap_or("Result");
                    format!("## {} ({})\n\n{}", title, outcome.capability_name, outcome.answer.trim())
                })
                .collect();
            ComposedResponse::answer(sections.join("\n\n"))
        }
    }
}

/// Clarification asking which domain a query is about
pub fn domain_clarification(registry: &CapabilityRegistry) -> ComposedResponse {
    let domains: Vec<String> = registry
        .descriptors()
        .map(|d| format!("{} ({})", d.domain.title(), d.name))
        .collect();
    ComposedResponse::clarification(format!(
        "I'm not sure which area this is about. I can look into: {}. Which one do you mean?",
        domains.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SwitchboardConfig;

    fn registry() -> CapabilityRegistry {
        CapabilityRegistry::from_config(&SwitchboardConfig::default())
    }

    #[test]
    fn test_clarification_suppresses_answers() {
        let outcomes = vec![
            HandlerOutcome::answered("metrics", "3 alerts firing", Vec::new()),
            HandlerOutcome::clarify("kubernetes", "Which namespace? Or a specific pod name?", Vec::new()),
            HandlerOutcome::clarify("docs", "What would you like me to look up?", Vec::new()),
        ];

        let response = compose(&outcomes, &registry());
        assert!(response.needs_clarification);
        assert_eq!(response.text, "Which namespace? Or a specific pod name?");
    }

    #[test]
    fn test_single_answer_verbatim() {
        let outcomes = vec![HandlerOutcome::answered("incidents", "No incidents detected.", Vec::new())];
        let response = compose(&outcomes, &registry());
        assert!(!response.needs_clarification);
        assert_eq!(response.text, "No incidents detected.");
    }

    #[test]
    fn test_sections_attributed_in_order() {
        let outcomes = vec![
            HandlerOutcome::answered("metrics", "2 alerts firing", Vec::new()),
            HandlerOutcome::answered("incidents", "1 critical incident", Vec::new()),
        ];
        let response = compose(&outcomes, &registry());
        assert_eq!(
            response.text,
            "## Metrics (metrics)\n\n2 alerts firing\n\n## Incidents (incidents)\n\n1 critical incident"
        );
    }

    #[test]
    fn test_domain_clarification_lists_domains() {
        let response = domain_clarification(&registry());
        assert!(response.needs_clarification);
        assert!(response.text.contains("Cluster resources (kubernetes)"));
        assert!(response.text.contains("Documentation (docs)"));
    }
}
