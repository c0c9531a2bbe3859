//! Browser engine detection from the `User-Agent` header

use crate::analytics::models::EngineLabel;

/// Classify a user-agent string. Checks run most-specific first: Blink
/// browsers also advertise `AppleWebKit`.
pub fn classify(user_agent: &str) -> EngineLabel {
    let ua = user_agent.to_lowercase();
    if ua.contains("webkit") && ua.contains("chrome") {
        EngineLabel::Blink
    } else if ua.contains("webkit") {
        EngineLabel::WebKit
    } else if ua.contains("gecko") && ua.contains("firefox") {
        EngineLabel::Gecko
    } else if ua.contains("trident") || ua.contains("msie") {
        EngineLabel::Trident
    } else {
        EngineLabel::Other
    }
}
