use crate::table::{equal_split, CellSpec, RowSpec, FULL_WIDTH};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TemplateField {
    Title,
    Date,
    Grade,
    Subject,
    School,
    TeacherName,
    CourseLevel,
    LessonTime,
    Location,
    Duration,
    Outcomes,
    Objectives,
    Materials,
    Resources,
    PriorKnowledge,
    Activities,
    Assessment,
    Differentiation,
    Extensions,
    References,
    Rubric,
    Safety,
    EssentialQuestions,
    EssentialVocabulary,
    CrossCurricular,
    AnticipatorySet,
    BodySequence,
    Closing,
    TimedActivities,
    UnderstandingChecks,
    StudentFeedback,
    LookingAhead,
}

/// How a field turns into table rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLayout {
    /// Plan metadata; contributes no rows.
    Metadata,
    /// One full-width labelled row.
    Section,
    /// Header row plus one activity row in a 25/50/25 grid.
    TimedGrid,
}

struct FieldMeta {
    key: &'static str,
    label: &'static str,
    hint: &'static str,
    layout: FieldLayout,
}

const fn describe(
    key: &'static str,
    label: &'static str,
    hint: &'static str,
    layout: FieldLayout,
) -> FieldMeta {
    FieldMeta {
        key,
        label,
        hint,
        layout,
    }
}

impl TemplateField {
    pub const ALL: [TemplateField; 32] = [
        Self::Title,
        Self::Date,
        Self::Grade,
        Self::Subject,
        Self::School,
        Self::TeacherName,
        Self::CourseLevel,
        Self::LessonTime,
        Self::Location,
        Self::Duration,
        Self::Outcomes,
        Self::Objectives,
        Self::Materials,
        Self::Resources,
        Self::PriorKnowledge,
        Self::Activities,
        Self::Assessment,
        Self::Differentiation,
        Self::Extensions,
        Self::References,
        Self::Rubric,
        Self::Safety,
        Self::EssentialQuestions,
        Self::EssentialVocabulary,
        Self::CrossCurricular,
        Self::AnticipatorySet,
        Self::BodySequence,
        Self::Closing,
        Self::TimedActivities,
        Self::UnderstandingChecks,
        Self::StudentFeedback,
        Self::LookingAhead,
    ];

    // Adding a variant without an entry here fails to compile.
    fn meta(self) -> FieldMeta {
        use FieldLayout::{Metadata, Section, TimedGrid};
        match self {
            Self::Title => describe("title", "Title", "Lesson title", Metadata),
            Self::Date => describe("date", "Date", "Date", Section),
            Self::Grade => describe("grade", "Grade/Class", "Grade/Class", Section),
            Self::Subject => describe("subject", "Subject", "e.g., Science", Section),
            Self::School => describe("school", "School", "School", Section),
            Self::TeacherName => describe("teacherName", "Name", "Name", Section),
            Self::CourseLevel => describe("courseLevel", "Course/level", "Course/level", Section),
            Self::LessonTime => describe("lessonTime", "Lesson time", "Lesson time", Section),
            Self::Location => describe(
                "location",
                "Location/facility",
                "e.g., Classroom, Gym",
                Section,
            ),
            Self::Duration => describe("duration", "Duration", "e.g., 60 minutes", Section),
            Self::Outcomes => describe(
                "outcomes",
                "Outcome(s) (quoted from program of studies)",
                "e.g., SCI10-1: Analyze the structure of cells",
                Section,
            ),
            Self::Objectives => describe(
                "objectives",
                "Objectives",
                "What will students know, understand, and be able to do?",
                Section,
            ),
            Self::Materials => describe(
                "materials",
                "Materials",
                "List the materials students and teacher need",
                Section,
            ),
            Self::Resources => describe(
                "resources",
                "Resources",
                "Textbooks, video links, chart paper",
                Section,
            ),
            Self::PriorKnowledge => describe(
                "priorKnowledge",
                "Prerequisites/Previous Knowledge",
                "Students should have a basic understanding of...",
                Section,
            ),
            Self::Activities => describe(
                "activities",
                "Activities",
                "Outline the learning activities",
                Section,
            ),
            Self::Assessment => describe(
                "assessment",
                "Assessment",
                "How will learning be assessed?",
                Section,
            ),
            Self::Differentiation => describe(
                "differentiation",
                "Differentiated instructions",
                "Enter differentiated instructions...",
                Section,
            ),
            Self::Extensions => describe(
                "extensions",
                "Extensions",
                "Enrichment for students who finish early",
                Section,
            ),
            Self::References => describe("references", "References", "Sources and citations", Section),
            Self::Rubric => describe("rubric", "Rubric", "Criteria and performance levels", Section),
            Self::Safety => describe(
                "safety",
                "Safety Considerations",
                "e.g., Proper handling of lab equipment",
                Section,
            ),
            Self::EssentialQuestions => describe(
                "essentialQuestions",
                "Essential question(s)",
                "Enter essential questions...",
                Section,
            ),
            Self::EssentialVocabulary => describe(
                "essentialVocabulary",
                "Essential vocabulary",
                "Key terms for this lesson",
                Section,
            ),
            Self::CrossCurricular => describe(
                "crossCurricular",
                "Cross-curricular connections",
                "Links to other subjects",
                Section,
            ),
            Self::AnticipatorySet => describe(
                "anticipatorySet",
                "Anticipatory set/hook",
                "Anticipatory set/hook...",
                Section,
            ),
            Self::BodySequence => describe(
                "bodySequence",
                "Body/activities/strategies",
                "Body/activities/strategies...",
                Section,
            ),
            Self::Closing => describe("closing", "Closing", "Closing", Section),
            Self::TimedActivities => describe(
                "timedActivities",
                "Timed activities",
                "Body/activities/strategies...",
                TimedGrid,
            ),
            Self::UnderstandingChecks => describe(
                "understandingChecks",
                "Check for understanding",
                "Formative assessment...",
                Section,
            ),
            Self::StudentFeedback => describe(
                "studentFeedback",
                "Student feedback",
                "How will students reflect and give feedback?",
                Section,
            ),
            Self::LookingAhead => describe(
                "lookingAhead",
                "Looking ahead",
                "What comes next lesson?",
                Section,
            ),
        }
    }

    pub fn key(self) -> &'static str {
        self.meta().key
    }

    pub fn label(self) -> &'static str {
        self.meta().label
    }

    pub fn hint(self) -> &'static str {
        self.meta().hint
    }

    pub fn layout(self) -> FieldLayout {
        self.meta().layout
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.key() == raw)
    }

    /// Rows generated for this field. `prefill` is appended after the label (or placed in
    /// the activity cell for the timed grid).
    pub fn rows(self, prefill: Option<&str>) -> Vec<RowSpec> {
        let prefill = prefill.map(str::trim).filter(|s| !s.is_empty());
        match self.layout() {
            FieldLayout::Metadata => Vec::new(),
            FieldLayout::Section => {
                let content = match prefill {
                    Some(text) => format!("<strong>{}:</strong> {}", self.label(), text),
                    None => format!("<strong>{}:</strong>", self.label()),
                };
                vec![RowSpec::new(vec![CellSpec::new(
                    content,
                    self.hint(),
                    FULL_WIDTH,
                )])]
            }
            FieldLayout::TimedGrid => {
                let mut rows = timed_grid();
                if let (Some(text), Some(body)) = (prefill, rows.get_mut(1)) {
                    body.cells[1].content = text.to_string();
                }
                rows
            }
        }
    }
}

fn timed_grid() -> Vec<RowSpec> {
    vec![
        RowSpec::header(vec![
            CellSpec::new("<b>Time for activity (in minutes)</b>", "", 25.0),
            CellSpec::new("<b>Description of activity, New learning</b>", "", 50.0),
            CellSpec::new("<b>Check for understanding</b>", "", 25.0),
        ]),
        RowSpec::new(vec![
            CellSpec::new("", "Anticipatory set/hook...", 25.0),
            CellSpec::new("", "Body/activities/strategies...", 50.0),
            CellSpec::new(
                "<ul><li>Real world connections</li><li>Student Feedback</li><li>Looking ahead</li></ul>",
                "Closing",
                25.0,
            ),
        ]),
    ]
}

/// Rows for an ordered field list. Fields repeat as often as they are listed.
pub fn build_rows(fields: &[TemplateField], prefill: &HashMap<TemplateField, String>) -> Vec<RowSpec> {
    fields
        .iter()
        .flat_map(|f| f.rows(prefill.get(f).map(String::as_str)))
        .collect()
}

fn labelled(label: &str, placeholder: &str, size: f64) -> CellSpec {
    CellSpec::new(format!("<strong>{}:</strong>", label), placeholder, size)
}

/// Starting table for a plan created without a field selection.
pub fn default_layout() -> Vec<RowSpec> {
    let thirds = equal_split(3);
    let mut rows = vec![
        RowSpec::new(vec![
            labelled("Date", "Date", thirds[0]),
            labelled("Grade/Class", "Grade/Class", thirds[1]),
            labelled("Name", "Name", thirds[2]),
        ]),
        RowSpec::new(vec![
            labelled("Course/level", "Course/level", thirds[0]),
            labelled("School", "School", thirds[1]),
            labelled("Lesson time", "Lesson time", thirds[2]),
        ]),
        RowSpec::new(vec![
            labelled(
                "Prerequisites/Previous Knowledge",
                "Students should have a basic understanding of...",
                66.66,
            ),
            labelled("Location/facility", "e.g., Classroom, Gym", 33.34),
        ]),
        RowSpec::new(vec![
            labelled(
                "Outcome(s) (quoted from program of studies)",
                "e.g., SCI10-1: Analyze the structure of cells",
                66.66,
            ),
            labelled("Resources", "Textbooks, video links, chart paper", 33.34),
        ]),
        RowSpec::new(vec![
            labelled(
                "Goal of this lesson/demo",
                "What will students know, understand, and be able to do?",
                66.66,
            ),
            labelled(
                "Safety Considerations",
                "e.g., Proper handling of lab equipment",
                33.34,
            ),
        ]),
        RowSpec::new(vec![labelled(
            "Essential question(s)",
            "Enter essential questions...",
            FULL_WIDTH,
        )]),
        RowSpec::new(vec![labelled(
            "Differentiated instructions",
            "Enter differentiated instructions...",
            FULL_WIDTH,
        )]),
    ];
    rows.extend(timed_grid());
    rows
}

#[derive(Debug, Clone, Serialize)]
pub struct Template {
    pub id: &'static str,
    pub name: &'static str,
    pub summary: &'static str,
    pub fields: &'static [TemplateField],
}

pub const BUILTIN_TEMPLATES: [Template; 4] = [
    Template {
        id: "standard",
        name: "Standard Lesson",
        summary: "Outcomes, objectives, materials, timed activities and assessment.",
        fields: &[
            TemplateField::Title,
            TemplateField::Date,
            TemplateField::Grade,
            TemplateField::Outcomes,
            TemplateField::Objectives,
            TemplateField::Materials,
            TemplateField::TimedActivities,
            TemplateField::Assessment,
            TemplateField::Differentiation,
        ],
    },
    Template {
        id: "quick",
        name: "Quick Plan",
        summary: "A one-page outline for a single period.",
        fields: &[
            TemplateField::Title,
            TemplateField::Objectives,
            TemplateField::Activities,
            TemplateField::Assessment,
        ],
    },
    Template {
        id: "inquiry",
        name: "Inquiry Lesson",
        summary: "Built around essential questions and student investigation.",
        fields: &[
            TemplateField::Title,
            TemplateField::Grade,
            TemplateField::Subject,
            TemplateField::EssentialQuestions,
            TemplateField::PriorKnowledge,
            TemplateField::Activities,
            TemplateField::CrossCurricular,
            TemplateField::UnderstandingChecks,
            TemplateField::StudentFeedback,
        ],
    },
    Template {
        id: "direct",
        name: "Direct Instruction",
        summary: "Hook, body sequence and closing with safety and vocabulary notes.",
        fields: &[
            TemplateField::Title,
            TemplateField::Date,
            TemplateField::CourseLevel,
            TemplateField::LessonTime,
            TemplateField::EssentialVocabulary,
            TemplateField::Safety,
            TemplateField::AnticipatorySet,
            TemplateField::BodySequence,
            TemplateField::Closing,
            TemplateField::LookingAhead,
        ],
    },
];

pub fn find_template(id: &str) -> Option<&'static Template> {
    BUILTIN_TEMPLATES.iter().find(|t| t.id == id)
}
