//! Prompt text sent to the generative model.
//!
//! Everything here is a pure function of its inputs, so a prompt can be rebuilt
//! for a retry and produce exactly the same text.

use crate::models::{ChatMessage, GameType, GenerationMode};

/// How many transcript messages preceding a new instruction are replayed.
pub const MAX_HISTORY_MESSAGES: usize = 10;

const NO_ARTIFACT: &str = "No game code provided yet";

const PREAMBLE: &str = "You are a helpful AI assistant specialized in creating and modifying \
                        HTML5 games. You help users create, update, and improve their games \
                        based on their requests.";

const GUIDELINES: &[&str] = &[
    "Provide complete HTML files with embedded CSS and JavaScript",
    "Use modern JavaScript features and HTML5 canvas when appropriate",
    "Make games interactive and fun",
    "Include proper styling and animations",
    "Keep code clean and well-commented",
    "Always respond in a friendly, encouraging tone",
];

const CREATE_SHAPE: &str = "Respond with ONLY the complete HTML document for the game, starting \
                            with <!DOCTYPE html>, inside a single ```html fenced block. Do not add \
                            explanations or any text outside the fenced block.";

const ITERATE_SHAPE: &str = "Respond in exactly this shape:\n\
                             1. A short explanation (two or three sentences) of what you changed and why.\n\
                             2. The complete updated HTML document, starting with <!DOCTYPE html>, \
                             inside a single ```html fenced block.\n\
                             Do not include any other code blocks.";

/// Builds the full request text for one turn.
///
/// `history` is the recent transcript *before* `instruction`; when non-empty it
/// is flattened ahead of the instructional template.
pub fn build(
    current_artifact: &str,
    instruction: &str,
    history: &[ChatMessage],
    mode: GenerationMode,
) -> String {
    let artifact = if current_artifact.trim().is_empty() {
        NO_ARTIFACT
    } else {
        current_artifact
    };
    let shape = match mode {
        GenerationMode::Create => CREATE_SHAPE,
        GenerationMode::Iterate => ITERATE_SHAPE,
    };

    let template = format!(
        "{PREAMBLE}\n\n\
         Current game code:\n```html\n{artifact}\n```\n\n\
         Guidelines:\n{guidelines}\n\n\
         {shape}\n\n\
         User's request: {instruction}",
        guidelines = numbered(GUIDELINES.iter().copied()),
    );

    if history.is_empty() {
        template
    } else {
        format!("{}\n\nUser: {template}", flatten_history(history))
    }
}

/// `"<Role>: <content>"` per message, blank-line separated.
pub fn flatten_history(history: &[ChatMessage]) -> String {
    history
        .iter()
        .map(|m| format!("{}: {}", m.role.label(), m.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// The tail of `messages` worth replaying as context.
pub fn recent_history(messages: &[ChatMessage]) -> &[ChatMessage] {
    let start = messages.len().saturating_sub(MAX_HISTORY_MESSAGES);
    &messages[start..]
}

// ── One-shot generation ───────────────────────────────────────────────────────

const BASE_REQUIREMENTS: &[&str] = &[
    "Create a COMPLETE HTML file with embedded CSS and JavaScript",
    "The game should be immediately playable and interactive",
    "Include proper game mechanics (controls, scoring, win/lose conditions)",
    "Add visual feedback and animations",
    "Use retro/arcade styling that fits a gaming platform",
    "Make it responsive and mobile-friendly",
    "Include clear instructions for the player",
    "The game should be fun and engaging",
];

/// Builds the prompt for generating a brand new game from a description.
pub fn build_generation(description: &str, game_type: GameType) -> String {
    let (role, extra, closing): (&str, &[&str], &str) = match game_type {
        GameType::TwoD => (
            "a specialized HTML5 game generator for classic 2D games",
            &[
                "Use HTML5 Canvas for 2D graphics rendering",
                "Implement smooth animations using requestAnimationFrame",
                "Add simple physics and collision detection",
                "Use vanilla JavaScript (no external frameworks)",
                "Include keyboard and/or mouse controls",
                "Add sound effects using Web Audio API if possible",
            ],
            "Use only HTML, CSS, and vanilla JavaScript.",
        ),
        GameType::AdvancedTwoD => (
            "a specialized 2D HTML5 game generator using the Phaser.js framework",
            &[
                "Use Phaser.js for advanced 2D game features",
                "Include a physics engine (Arcade or Matter.js physics)",
                "Add sprite animations and tweening",
                "Implement scene management and game states",
                "Include CDN links for the Phaser.js library",
                "Add particle effects and a sound management system",
            ],
            "Include Phaser.js from a CDN.",
        ),
        GameType::ThreeD => (
            "a specialized 3D HTML5 game generator using Three.js",
            &[
                "Use Three.js for 3D graphics and WebGL rendering",
                "Include proper 3D camera controls and movement",
                "Add lighting and materials",
                "Use basic collision detection where appropriate",
                "Include CDN links for the Three.js library",
                "Add sound effects using Web Audio API if possible",
            ],
            "Include Three.js from a CDN.",
        ),
    };

    format!(
        "You are {role}. Create a complete, playable game based on this description: \"{description}\"\n\n\
         Requirements:\n{requirements}\n\n\
         Game Description: {description}\n\n\
         Please provide ONLY the complete HTML code for the game, no explanations or markdown \
         formatting. {closing} The code should be ready to run immediately.",
        requirements = numbered(BASE_REQUIREMENTS.iter().chain(extra.iter()).copied()),
    )
}

fn numbered<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items
        .enumerate()
        .map(|(i, item)| format!("{}. {item}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageRole;

    fn msg(role: MessageRole, content: &str) -> ChatMessage {
        ChatMessage::new(role, content)
    }

    #[test]
    fn same_inputs_give_same_prompt() {
        let history = vec![msg(MessageRole::User, "make it red")];
        let a = build("<!DOCTYPE html><html></html>", "add a score", &history, GenerationMode::Iterate);
        let b = build("<!DOCTYPE html><html></html>", "add a score", &history, GenerationMode::Iterate);
        assert_eq!(a, b);
    }

    #[test]
    fn empty_artifact_is_marked_as_missing() {
        let prompt = build("", "make a pong game", &[], GenerationMode::Create);
        assert!(prompt.contains("```html\nNo game code provided yet\n```"));
        assert!(prompt.ends_with("User's request: make a pong game"));
        assert!(prompt.starts_with(PREAMBLE));
    }

    #[test]
    fn artifact_is_embedded_verbatim() {
        let artifact = "<!DOCTYPE html>\n<html>\n  <body>hi</body>\n</html>";
        let prompt = build(artifact, "bigger text", &[], GenerationMode::Iterate);
        assert!(prompt.contains(&format!("```html\n{artifact}\n```")));
    }

    #[test]
    fn history_is_flattened_before_template() {
        let history = vec![
            msg(MessageRole::User, "make a snake game"),
            msg(MessageRole::Assistant, "Here it is"),
        ];
        let prompt = build("", "faster please", &history, GenerationMode::Iterate);
        assert!(prompt.starts_with("User: make a snake game\n\nAssistant: Here it is\n\nUser: "));
        assert!(prompt.contains(PREAMBLE));
    }

    #[test]
    fn modes_ask_for_different_shapes() {
        let create = build("", "pong", &[], GenerationMode::Create);
        let iterate = build("", "pong", &[], GenerationMode::Iterate);
        assert!(create.contains("Do not add explanations"));
        assert!(create.contains("inside a single ```html fenced block"));
        assert!(!create.contains("short explanation"));
        assert!(iterate.contains("short explanation"));
        assert!(iterate.contains("single ```html fenced block"));
    }

    #[test]
    fn recent_history_keeps_the_tail() {
        let messages: Vec<_> = (0..15).map(|i| msg(MessageRole::User, &i.to_string())).collect();
        let recent = recent_history(&messages);
        assert_eq!(recent.len(), MAX_HISTORY_MESSAGES);
        assert_eq!(recent[0].content, "5");
        assert_eq!(recent_history(&messages[..3]).len(), 3);
    }

    #[test]
    fn generation_prompt_varies_by_game_type() {
        let two_d = build_generation("a maze", GameType::TwoD);
        let phaser = build_generation("a maze", GameType::AdvancedTwoD);
        let three_d = build_generation("a maze", GameType::ThreeD);

        assert!(two_d.contains("vanilla JavaScript"));
        assert!(phaser.contains("Phaser.js"));
        assert!(three_d.contains("Three.js"));
        assert!(two_d.contains("1. Create a COMPLETE HTML file"));
        assert!(two_d.contains("14. Add sound effects"));
        assert!(three_d.contains("Game Description: a maze"));
    }
}
