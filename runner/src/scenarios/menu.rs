use serde_json::json;

use crate::protocol::{
    Action, Expectation, Interaction, Locator, Scenario, ScenarioConfig, Scope, Step, WaitState,
};

fn open_button() -> Locator {
    Locator::role("button").named("${open_menu_label}")
}

fn close_button() -> Locator {
    Locator::role("button").named("${close_menu_label}")
}

fn menu_items() -> Locator {
    Locator::within(Locator::role("menu"), Locator::role("menuitem"))
}

fn check(id: &str, locator: Locator, expectation: Expectation) -> Step {
    Step::new(
        id,
        Action::Assert {
            locator,
            expectation,
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

/// Menu toggle exposes its state through ARIA.
///
/// Starts a game, then checks the menu button's `aria-expanded` before and
/// after opening, the relabelled close control, and that every menu item
/// hides its decorative icon from assistive technology.
pub fn menu_a11y() -> Scenario {
    let mut config = ScenarioConfig::default();
    config
        .variables
        .insert("open_menu_label".to_string(), json!("Open menu"));
    config
        .variables
        .insert("close_menu_label".to_string(), json!("Close menu"));

    Scenario {
        id: "menu_a11y".to_string(),
        description: "Menu button exposes its expanded state".to_string(),
        config,
        steps: vec![
            Step::new(
                "open_app",
                Action::Navigate {
                    url: "${base_url}".to_string(),
                    timeout_ms: None,
                },
            ),
            click("start_game", Locator::css("button").has_text("Start Game"))
                .mandatory()
                .describe("The title screen must offer a way in"),
            Step::new(
                "menu_button_ready",
                Action::WaitFor {
                    locator: open_button(),
                    state: WaitState::Visible,
                    timeout_ms: 5_000,
                },
            )
            .mandatory(),
            check(
                "menu_collapsed",
                open_button(),
                Expectation::attribute_equals("aria-expanded", "false"),
            ),
            click("open_menu", open_button()).mandatory(),
            Step::new(
                "menu_open",
                Action::WaitFor {
                    locator: Locator::role("menu"),
                    state: WaitState::Visible,
                    timeout_ms: 2_000,
                },
            )
            .mandatory(),
            check("close_label", close_button(), Expectation::Visible),
            check(
                "menu_expanded",
                close_button(),
                Expectation::attribute_equals("aria-expanded", "true"),
            ),
            check("menu_items", menu_items(), Expectation::CountAtLeast { min: 1 }),
            check(
                "item_icons_hidden",
                menu_items(),
                Expectation::markup_contains("aria-hidden=\"true\"", Scope::Every),
            ),
        ],
    }
}
