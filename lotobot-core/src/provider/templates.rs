use crate::error::Result;
use crate::provider::TemplateSource;
use crate::types::Lottery;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKey {
    /// Private message to each winner.
    Winner,
    /// Summary sent to the lottery creator after the draw.
    Creator,
    /// Result message pushed to destination chats.
    Group,
    /// Announcement pushed while the lottery is open.
    Announcement,
}

impl TemplateKey {
    pub fn default_template(&self) -> &'static str {
        match self {
            Self::Winner => {
                "Congratulations {name}! You won \"{prize}\" in the lottery \"{title}\" (#{id})."
            }
            Self::Creator => {
                "Your lottery \"{title}\" (#{id}) has been drawn.\n\
                 Participants: {count}\nWinners:\n{winners}"
            }
            Self::Group => {
                "The lottery \"{title}\" (#{id}) has been drawn!\nWinners:\n{winners}"
            }
            Self::Announcement => {
                "Lottery \"{title}\" (#{id}) is open!\nPrizes:\n{prizes}\n\
                 Participants so far: {count}"
            }
        }
    }
}

/// Pick the template text for a key: per-lottery override first, then the
/// owner's entry in the custom template store, then the built-in default.
pub async fn resolve(
    lottery: &Lottery,
    key: TemplateKey,
    source: &dyn TemplateSource,
) -> Result<String> {
    let override_text = match key {
        TemplateKey::Winner => lottery.winner_template.as_ref(),
        TemplateKey::Creator => lottery.creator_template.as_ref(),
        TemplateKey::Group => lottery.group_template.as_ref(),
        TemplateKey::Announcement => None,
    };
    if let Some(text) = override_text {
        return Ok(text.clone());
    }
    if let Some(text) = source.custom(key, lottery.created_by).await? {
        return Ok(text);
    }
    Ok(key.default_template().to_string())
}

/// Fill `{placeholder}` slots in a template. Unknown placeholders are left
/// in place so a broken custom template still produces visible output.
pub fn render(template: &str, substitutions: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in substitutions {
        out = out.replace(&format!("{{{}}}", key), value);
    }
    out
}

/// Template source with no custom entries; every render uses the defaults.
pub struct NoCustomTemplates;

#[async_trait]
impl TemplateSource for NoCustomTemplates {
    async fn custom(&self, _key: TemplateKey, _owner_id: i64) -> Result<Option<String>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_substitutes_all_placeholders() {
        let text = render(
            "Hi {name}, you won {prize}!",
            &[("name", "Ada"), ("prize", "a mug")],
        );
        assert_eq!(text, "Hi Ada, you won a mug!");
    }

    #[test]
    fn render_leaves_unknown_placeholders() {
        let text = render("Hi {name} {missing}", &[("name", "Ada")]);
        assert_eq!(text, "Hi Ada {missing}");
    }

    #[test]
    fn repeated_placeholder_is_replaced_everywhere() {
        let text = render("{title} / {title}", &[("title", "X")]);
        assert_eq!(text, "X / X");
    }
}
