use anyhow::Result;
use buildwatch_core::models::BuildResult;
use serde::Deserialize;

#[derive(Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ShieldParams {
    label: Option<String>,
    label_color: Option<String>,
    style: Option<String>,
}

/// Text and colors of a status badge.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Badge {
    label: String,
    message: &'static str,
    color: &'static str,
    style: Option<String>,
    label_color: Option<String>,
}

fn message(result: BuildResult) -> &'static str {
    match result {
        BuildResult::Success => "passing",
        BuildResult::Failure => "failing",
        BuildResult::Aborted => "aborted",
        BuildResult::Unstable => "unstable",
        BuildResult::NotBuilt => "not built",
    }
}

fn color(result: BuildResult) -> &'static str {
    match result {
        BuildResult::Success => "success",
        BuildResult::Failure => "critical",
        BuildResult::Unstable => "important",
        BuildResult::Aborted => "inactive",
        BuildResult::NotBuilt => "lightgrey",
    }
}

pub fn render(result: BuildResult, default_label: &str, params: &ShieldParams) -> Badge {
    Badge {
        label: params.label.clone().unwrap_or_else(|| default_label.to_string()),
        message: message(result),
        color: color(result),
        style: params.style.clone(),
        label_color: params.label_color.clone(),
    }
}

pub fn render_svg(
    result: BuildResult,
    default_label: &str,
    params: &ShieldParams,
) -> Result<String> {
    let badge = render(result, default_label, params);
    let mut builder = badge_maker::BadgeBuilder::new();
    builder.label(&badge.label).message(badge.message);
    builder.color_parse(badge.color);
    if let Some(style) = &badge.style {
        builder.style_parse(style);
    }
    if let Some(label_color) = &badge.label_color {
        builder.label_color_parse(label_color);
    }
    let svg = builder.build()?.svg();
    Ok(svg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let badge = render(BuildResult::Failure, "nightly", &ShieldParams::default());
        assert_eq!(badge.label, "nightly");
        assert_eq!(badge.message, "failing");
        assert_eq!(badge.color, "critical");
        assert_eq!(badge.style, None);

        let params = ShieldParams { label: Some("build".to_string()), ..ShieldParams::default() };
        assert_eq!(render(BuildResult::NotBuilt, "nightly", &params).label, "build");
    }

    #[test]
    fn test_render_svg() {
        for &result in BuildResult::variants() {
            let svg = render_svg(result, "build", &ShieldParams::default()).unwrap();
            assert!(svg.contains("<svg"), "{svg}");
            assert!(svg.contains(message(result)));
        }
    }
}
