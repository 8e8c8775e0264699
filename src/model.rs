
use crate::error::Result;
use crate::markup;
use crate::types::Color;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDocument {
    pub title: String,
    #[serde(default)]
    pub job: JobMetadata,
    #[serde(default)]
    pub status_label: String,
    #[serde(default)]
    pub revision_label: String,
    #[serde(default)]
    pub revision_number: u32,
    #[serde(default)]
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMetadata {
    #[serde(default)]
    pub job_name: String,
    #[serde(default)]
    pub client_name: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub number: u32,
    pub name: String,
    #[serde(default)]
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub name: String,
    #[serde(default)]
    pub description_html: String,
    #[serde(default)]
    pub notes_html: String,
    #[serde(default)]
    pub answer_state: AnswerState,
    #[serde(default)]
    pub images: Vec<ImageRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    pub source: ImageSource,
    #[serde(default)]
    pub caption: String,
}

/// Inline bytes, a `data:` URL, or a reference the `ImageFetcher` resolves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageSource {
    Bytes(Vec<u8>),
    Url(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnswerState {
    Yes,
    No,
    #[default]
    Unanswered,
    #[serde(alias = "PS")]
    ProvisionalSum,
    #[serde(alias = "PC")]
    PrimeCost,
    #[serde(alias = "SC")]
    Subcontractor,
    #[serde(alias = "OTS")]
    OwnerToSupply,
    Excluded,
}

impl AnswerState {
    pub fn short_label(self) -> &'static str {
        match self {
            AnswerState::Yes => "Yes",
            AnswerState::No => "No",
            AnswerState::Unanswered => "-",
            AnswerState::ProvisionalSum => "PS",
            AnswerState::PrimeCost => "PC",
            AnswerState::Subcontractor => "SC",
            AnswerState::OwnerToSupply => "OTS",
            AnswerState::Excluded => "Excl",
        }
    }

    pub fn pill_color(self) -> Color {
        match self {
            AnswerState::Yes => Color::rgb8(46, 158, 79),
            AnswerState::No => Color::rgb8(209, 52, 56),
            AnswerState::Unanswered => Color::rgb8(150, 150, 150),
            AnswerState::ProvisionalSum => Color::rgb8(232, 135, 26),
            AnswerState::PrimeCost => Color::rgb8(135, 100, 184),
            AnswerState::Subcontractor => Color::rgb8(0, 120, 212),
            AnswerState::OwnerToSupply => Color::rgb8(0, 153, 153),
            AnswerState::Excluded => Color::rgb8(96, 94, 92),
        }
    }

    /// Whether an answer alone earns the row a place in the printout.
    pub fn is_reportable(self) -> bool {
        !matches!(self, AnswerState::Unanswered | AnswerState::Excluded)
    }
}

impl ReportDocument {
    pub fn from_json(raw: &str) -> Result<ReportDocument> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn visible_item_count(&self) -> usize {
        self.sections
            .iter()
            .map(|section| section.visible_items().count())
            .sum()
    }
}

impl Section {
    pub fn visible_items(&self) -> impl Iterator<Item = &Item> {
        self.items.iter().filter(|item| item.is_visible())
    }

    pub fn is_visible(&self) -> bool {
        self.visible_items().next().is_some()
    }
}

impl Item {
    pub fn is_visible(&self) -> bool {
        !markup::plain_text(&self.description_html).is_empty() || self.answer_state.is_reportable()
    }

    pub fn has_notes(&self) -> bool {
        !markup::plain_text(&self.notes_html).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(description: &str, answer: AnswerState) -> Item {
        Item {
            name: "Row".to_string(),
            description_html: description.to_string(),
            answer_state: answer,
            ..Item::default()
        }
    }

    #[test]
    fn visibility_requires_text_or_reportable_answer() {
        assert!(!item("", AnswerState::Excluded).is_visible());
        assert!(!item("", AnswerState::Unanswered).is_visible());
        assert!(!item("<p>  </p>", AnswerState::Unanswered).is_visible());
        assert!(item("<p>Check levels</p>", AnswerState::Unanswered).is_visible());
        assert!(item("", AnswerState::PrimeCost).is_visible());
    }

    #[test]
    fn section_with_only_hidden_items_is_hidden() {
        let section = Section {
            number: 3,
            name: "Roofing".to_string(),
            items: vec![
                item("", AnswerState::Excluded),
                item("", AnswerState::Unanswered),
            ],
        };
        assert!(!section.is_visible());
    }

    #[test]
    fn json_document_loads_with_defaults() {
        let doc = ReportDocument::from_json(
            r#"{
                "title": "PAP Checklist",
                "job": { "jobName": "J-1042", "clientName": "Smith", "date": "2024-03-01" },
                "revisionNumber": 4,
                "sections": [
                    { "number": 10, "name": "Foundations", "items": [
                        { "name": "Footings", "descriptionHtml": "<p>Poured</p>", "answerState": "YES",
                          "images": [ { "source": "Images/3" }, { "source": [1, 2, 3], "caption": "x" } ] },
                        { "name": "Piers", "answerState": "PS" }
                    ] }
                ]
            }"#,
        )
        .expect("valid json");
        assert_eq!(doc.revision_number, 4);
        let items = &doc.sections[0].items;
        assert_eq!(items[0].answer_state, AnswerState::Yes);
        assert_eq!(items[1].answer_state, AnswerState::ProvisionalSum);
        assert_eq!(items[0].images[0].source, ImageSource::Url("Images/3".to_string()));
        assert_eq!(items[0].images[1].source, ImageSource::Bytes(vec![1, 2, 3]));
        assert_eq!(doc.visible_item_count(), 2);
    }

    #[test]
    fn malformed_json_is_a_model_error() {
        let err = ReportDocument::from_json("{").expect_err("invalid");
        assert!(matches!(err, crate::ReportError::Model(_)));
    }
}
