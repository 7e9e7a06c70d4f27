use serde_json::json;

use crate::protocol::{Action, Expectation, Interaction, Locator, Scenario, ScenarioConfig, Step};

fn named_button(name: &str) -> Locator {
    Locator::role("button").named(name)
}

fn visible(id: &str, locator: Locator) -> Step {
    Step::new(
        id,
        Action::Assert {
            locator,
            expectation: Expectation::Visible,
            timeout_ms: None,
        },
    )
}

fn click(id: &str, locator: Locator) -> Step {
    Step::new(
        id,
        Action::Interact {
            locator,
            interaction: Interaction::Click,
            timeout_ms: None,
        },
    )
}

fn pause(id: &str, duration_ms: u64) -> Step {
    Step::new(id, Action::Pause { duration_ms })
}

/// In-game controls are reachable by name, and the player-count toggle
/// always reports its pressed state.
pub fn zoom_controls() -> Scenario {
    let mut config = ScenarioConfig::default();
    config
        .variables
        .insert("open_menu_label".to_string(), json!("Open game menu"));

    Scenario {
        id: "zoom_controls".to_string(),
        description: "Zoom controls and player-count toggle are exposed".to_string(),
        config,
        steps: vec![
            Step::new(
                "open_app",
                Action::Navigate {
                    url: "${base_url}".to_string(),
                    timeout_ms: None,
                },
            ),
            click("start_game", named_button("Start Game")).mandatory(),
            pause("game_settle", 1_000),
            visible("menu_button", named_button("${open_menu_label}")),
            visible("zoom_in", named_button("Zoom in")),
            visible("zoom_out", named_button("Zoom out")),
            visible("reset_zoom", named_button("Reset zoom")),
            click("open_menu", named_button("${open_menu_label}")),
            pause("menu_settle", 500),
            click("new_game", Locator::text("New Game")),
            pause("setup_settle", 500),
            visible("four_players", named_button("4 Players")),
            Step::new(
                "four_players_pressed",
                Action::Assert {
                    locator: named_button("4 Players"),
                    expectation: Expectation::attribute_one_of("aria-pressed", &["true", "false"]),
                    timeout_ms: None,
                },
            ),
        ],
    }
}
