use std::fmt;
use std::sync::Arc;

use seg_types::{ActionSource, ValueKind, Variant};

use super::StateError;

/// Session priority of variables that are never restored from a snapshot.
pub const DO_NOT_LOAD: i32 = -1;
/// Session priority unless a variable asks for something else.
pub const DEFAULT_LOAD: i32 = 100;

/// Delivered to observers after a value actually changed.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub id: String,
    pub value: Variant,
    pub source: ActionSource,
}

pub type ChangeObserver = Arc<dyn Fn(&StateChange) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// One allowed value of an option variable and the label shown for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionEntry {
    /// Lower-cased; this is what gets stored and exported.
    pub value: String,
    pub label: String,
}

impl OptionEntry {
    /// `text` must already be trimmed and lower-cased.
    fn matches(&self, text: &str) -> bool {
        self.value == text || self.label.to_lowercase() == text
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    None,
    /// Inclusive numeric range; only meaningful for int and double variables.
    Range { min: f64, max: f64 },
    /// Allowed values of an option or multi option variable.
    Options(Vec<OptionEntry>),
}

/// Parse a `value=Label|value=Label` list.
fn parse_option_list(id: &str, list: &str) -> Result<Vec<OptionEntry>, StateError> {
    let invalid = |entry: &str| StateError::InvalidOptionList {
        id: id.to_string(),
        entry: entry.to_string(),
    };
    list.split('|')
        .map(|pair| {
            let (value, label) = pair.split_once('=').ok_or_else(|| invalid(pair))?;
            let value = value.trim().to_lowercase();
            let label = label.trim();
            let bad_char = |c: char| c.is_whitespace() || matches!(c, '[' | ']' | ',' | '"');
            if value.is_empty() || label.is_empty() || value.contains(bad_char) {
                return Err(invalid(pair));
            }
            Ok(OptionEntry {
                value,
                label: label.to_string(),
            })
        })
        .collect()
}

/// One named, typed, constrained value.
///
/// The id and kind never change after construction. Values are checked
/// against the constraint on every write; a rejected write leaves the
/// current value untouched.
pub struct StateVariable {
    id: String,
    kind: ValueKind,
    value: Variant,
    constraint: Constraint,
    locked: bool,
    project_data: bool,
    session_priority: i32,
    observers: Vec<(SubscriptionId, ChangeObserver)>,
    next_subscription: u64,
}

impl StateVariable {
    /// The kind is taken from the default value.
    pub fn new(id: impl Into<String>, default: impl Into<Variant>) -> Self {
        let value = default.into();
        let kind = match &value {
            Variant::Bool(_) => ValueKind::Bool,
            Variant::Int(_) => ValueKind::Int,
            Variant::Double(_) => ValueKind::Double,
            Variant::Str(_) => ValueKind::String,
            Variant::StrVec(_) => ValueKind::MultiOption,
            Variant::IntVec(_) => ValueKind::IntVector,
            Variant::DoubleVec(_) => ValueKind::DoubleVector,
        };
        Self {
            id: id.into(),
            kind,
            value,
            constraint: Constraint::None,
            locked: false,
            project_data: false,
            session_priority: DEFAULT_LOAD,
            observers: Vec::new(),
            next_subscription: 0,
        }
    }

    /// A string restricted to `options`, compared case-insensitively.
    pub fn option(id: impl Into<String>, default: &str, options: &[&str]) -> Self {
        let mut var = Self::new(id, default.trim().to_lowercase());
        var.kind = ValueKind::Option;
        var.constraint = Constraint::Options(
            options
                .iter()
                .map(|o| OptionEntry {
                    value: o.trim().to_lowercase(),
                    label: o.trim().to_string(),
                })
                .collect(),
        );
        var
    }

    /// An option whose values carry display labels, given as
    /// `value=Label|value=Label`. Writes accept a value or a label.
    pub fn labeled_option(
        id: impl Into<String>,
        default: &str,
        list: &str,
    ) -> Result<Self, StateError> {
        let id = id.into();
        let options = parse_option_list(&id, list)?;
        let mut var = Self::new(id, String::new());
        var.kind = ValueKind::Option;
        var.constraint = Constraint::Options(options);
        var.value = var.validate(&Variant::Str(default.to_string()))?;
        Ok(var)
    }

    /// Any subset of the labeled options in `list`, stored in selection
    /// order without repeats.
    pub fn multi_option(
        id: impl Into<String>,
        defaults: &[&str],
        list: &str,
    ) -> Result<Self, StateError> {
        let id = id.into();
        let options = parse_option_list(&id, list)?;
        let mut var = Self::new(id, Vec::<String>::new());
        var.constraint = Constraint::Options(options);
        let defaults = defaults.iter().map(|d| d.to_string()).collect();
        var.value = var.validate(&Variant::StrVec(defaults))?;
        Ok(var)
    }

    /// Reversed bounds are swapped.
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        let (min, max) = if min > max { (max, min) } else { (min, max) };
        self.constraint = Constraint::Range { min, max };
        self
    }

    /// Project data is saved with the project and recorded in undo and
    /// provenance history.
    pub fn with_project_data(mut self, project_data: bool) -> Self {
        self.project_data = project_data;
        self
    }

    pub fn with_locked(mut self, locked: bool) -> Self {
        self.locked = locked;
        self
    }

    /// Higher priorities are restored first; [`DO_NOT_LOAD`] skips restore.
    pub fn with_session_priority(mut self, priority: i32) -> Self {
        self.session_priority = priority;
        self
    }

    pub(crate) fn set_namespace(&mut self, namespace: &str) {
        self.id = format!("{}::{}", namespace, self.id);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn value(&self) -> &Variant {
        &self.value
    }

    pub fn constraint(&self) -> &Constraint {
        &self.constraint
    }

    /// Label of the current option value.
    pub fn option_label(&self) -> Option<&str> {
        self.selected_labels().into_iter().next()
    }

    /// Labels of every selected option, in stored order.
    pub fn selected_labels(&self) -> Vec<&str> {
        let Constraint::Options(options) = &self.constraint else {
            return Vec::new();
        };
        let label = |value: &str| {
            options
                .iter()
                .find(|o| o.value == value)
                .map(|o| o.label.as_str())
        };
        match &self.value {
            Variant::Str(value) => label(value).into_iter().collect(),
            Variant::StrVec(values) => values.iter().filter_map(|v| label(v)).collect(),
            _ => Vec::new(),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    pub fn is_project_data(&self) -> bool {
        self.project_data
    }

    pub fn session_priority(&self) -> i32 {
        self.session_priority
    }

    /// Convert `value` to this variable's kind and check the constraint.
    /// Returns the normalized value that a write would store.
    pub fn validate(&self, value: &Variant) -> Result<Variant, StateError> {
        let value = value
            .coerce(self.kind)
            .map_err(|source| StateError::Conversion {
                id: self.id.clone(),
                source,
            })?;
        let nan = match &value {
            Variant::Double(x) => x.is_nan(),
            Variant::DoubleVec(v) => v.iter().any(|x| x.is_nan()),
            _ => false,
        };
        if nan {
            return Err(StateError::NotANumber(self.id.clone()));
        }
        match &self.constraint {
            Constraint::Range { min, max } if self.kind.is_numeric() => {
                let x = value.as_double().unwrap_or(f64::NAN);
                if !(*min..=*max).contains(&x) {
                    return Err(StateError::OutOfRange {
                        id: self.id.clone(),
                        value: x,
                        min: *min,
                        max: *max,
                    });
                }
            }
            Constraint::Options(options) => {
                return match value {
                    Variant::Str(text) => Ok(Variant::Str(self.pick_option(options, &text)?)),
                    Variant::StrVec(items) => {
                        let mut picked: Vec<String> = Vec::with_capacity(items.len());
                        for item in &items {
                            let value = self.pick_option(options, item)?;
                            if !picked.contains(&value) {
                                picked.push(value);
                            }
                        }
                        Ok(Variant::StrVec(picked))
                    }
                    other => Ok(other),
                };
            }
            _ => {}
        }
        Ok(value)
    }

    /// Map a value or label onto the stored option value.
    fn pick_option(&self, options: &[OptionEntry], text: &str) -> Result<String, StateError> {
        let text = text.trim().to_lowercase();
        match options.iter().find(|o| o.matches(&text)) {
            Some(entry) => Ok(entry.value.clone()),
            None => Err(StateError::InvalidOption {
                id: self.id.clone(),
                value: text,
                options: options
                    .iter()
                    .map(|o| o.value.as_str())
                    .collect::<Vec<_>>()
                    .join(" "),
            }),
        }
    }

    /// Returns whether the stored value changed.
    pub fn set_value(&mut self, value: &Variant) -> Result<bool, StateError> {
        if self.locked {
            return Err(StateError::Locked(self.id.clone()));
        }
        let value = self.validate(value)?;
        if value == self.value {
            return Ok(false);
        }
        self.value = value;
        Ok(true)
    }

    pub fn set_from_string(&mut self, text: &str) -> Result<bool, StateError> {
        let value = self.parse(text)?;
        self.set_value(&value)
    }

    /// Parse `text` as this variable's kind without storing it.
    pub fn parse(&self, text: &str) -> Result<Variant, StateError> {
        self.kind
            .parse(text)
            .map_err(|source| StateError::Conversion {
                id: self.id.clone(),
                source,
            })
    }

    /// Canonical string form; [`StateVariable::set_from_string`] reads it back.
    pub fn export_to_string(&self) -> String {
        self.value.to_string()
    }

    pub fn subscribe(&mut self, observer: ChangeObserver) -> SubscriptionId {
        self.next_subscription += 1;
        let sub = SubscriptionId(self.next_subscription);
        self.observers.push((sub, observer));
        sub
    }

    pub fn unsubscribe(&mut self, sub: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(s, _)| *s != sub);
        self.observers.len() != before
    }

    /// Observers in subscription order, cloned so they can run unlocked.
    pub(crate) fn observers(&self) -> Vec<ChangeObserver> {
        self.observers.iter().map(|(_, o)| Arc::clone(o)).collect()
    }
}

impl fmt::Debug for StateVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateVariable")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("value", &self.value)
            .field("constraint", &self.constraint)
            .field("locked", &self.locked)
            .field("project_data", &self.project_data)
            .field("session_priority", &self.session_priority)
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_default() {
        assert_eq!(StateVariable::new("a", true).kind(), ValueKind::Bool);
        assert_eq!(StateVariable::new("a", 3).kind(), ValueKind::Int);
        assert_eq!(StateVariable::new("a", 0.5).kind(), ValueKind::Double);
        assert_eq!(StateVariable::new("a", "x").kind(), ValueKind::String);
        assert_eq!(
            StateVariable::new("a", vec![1.0, 2.0]).kind(),
            ValueKind::DoubleVector
        );
    }

    #[test]
    fn range_rejects_and_keeps_value() {
        let mut var = StateVariable::new("brightness", 1.0).with_range(10.0, 0.0);
        assert_eq!(
            var.constraint(),
            &Constraint::Range {
                min: 0.0,
                max: 10.0
            }
        );
        assert!(matches!(
            var.set_value(&Variant::Double(11.0)),
            Err(StateError::OutOfRange { .. })
        ));
        assert_eq!(var.value(), &Variant::Double(1.0));
        assert!(var.set_value(&Variant::Int(3)).unwrap());
        assert_eq!(var.value(), &Variant::Double(3.0));
    }

    #[test]
    fn nan_is_out_of_range() {
        let var = StateVariable::new("x", 0.0).with_range(0.0, 1.0);
        assert!(var.validate(&Variant::Double(f64::NAN)).is_err());
    }

    #[test]
    fn nan_is_rejected_without_range() {
        let mut var = StateVariable::new("sigma", 1.5);
        assert_eq!(
            var.set_from_string("NaN"),
            Err(StateError::NotANumber("sigma".into()))
        );
        assert_eq!(var.value(), &Variant::Double(1.5));
        assert!(!var.set_from_string(&var.export_to_string()).unwrap());

        let mut spacing = StateVariable::new("spacing", vec![1.0, 1.0, 2.0]);
        assert!(matches!(
            spacing.set_from_string("[1 nan 2]"),
            Err(StateError::NotANumber(_))
        ));
        assert!(spacing.set_from_string("[inf 1 2]").unwrap());
        assert_eq!(spacing.export_to_string(), "[inf 1 2]");
    }

    #[test]
    fn unchanged_write_reports_false() {
        let mut var = StateVariable::new("count", 2);
        assert!(!var.set_value(&Variant::Int(2)).unwrap());
        assert!(!var.set_from_string("2").unwrap());
        assert!(var.set_from_string("3").unwrap());
    }

    #[test]
    fn options_are_case_insensitive() {
        let mut var = StateVariable::option("tool", "Paint", &["paint", "Erase"]);
        assert_eq!(var.value(), &Variant::Str("paint".into()));
        assert!(var.set_from_string("ERASE").unwrap());
        assert_eq!(var.export_to_string(), "erase");
        assert!(matches!(
            var.set_from_string("fill"),
            Err(StateError::InvalidOption { .. })
        ));
    }

    #[test]
    fn labeled_option_accepts_value_or_label() {
        let mut var = StateVariable::labeled_option(
            "colormap",
            "Grey",
            "grey=Grey|rainbow=Rainbow|hot=Hot Metal",
        )
        .unwrap();
        assert_eq!(var.kind(), ValueKind::Option);
        assert_eq!(var.export_to_string(), "grey");
        assert_eq!(var.option_label(), Some("Grey"));

        assert!(var.set_from_string("hot metal").unwrap());
        assert_eq!(var.export_to_string(), "hot");
        assert_eq!(var.option_label(), Some("Hot Metal"));
        assert!(!var.set_from_string("HOT").unwrap());
        assert!(matches!(
            var.set_from_string("jet"),
            Err(StateError::InvalidOption { .. })
        ));

        let text = var.export_to_string();
        let mut copy =
            StateVariable::labeled_option("colormap", "grey", "grey=Grey|hot=Hot Metal").unwrap();
        assert!(copy.set_from_string(&text).unwrap());
        assert_eq!(copy.value(), var.value());
    }

    #[test]
    fn malformed_option_lists_are_rejected() {
        for list in ["grey", "grey=Grey|", "=Grey", "two words=Label", "a=A|b"] {
            assert!(
                matches!(
                    StateVariable::labeled_option("x", "a", list),
                    Err(StateError::InvalidOptionList { .. })
                ),
                "{:?} accepted",
                list
            );
        }
        assert!(matches!(
            StateVariable::labeled_option("x", "c", "a=A|b=B"),
            Err(StateError::InvalidOption { .. })
        ));
    }

    #[test]
    fn multi_option_normalizes_selection() {
        let list = "axial=Axial|coronal=Coronal|sagittal=Sagittal|volume=3D Volume";
        let mut var = StateVariable::multi_option("views", &["Axial"], list).unwrap();
        assert_eq!(var.kind(), ValueKind::MultiOption);
        assert_eq!(var.export_to_string(), "[axial]");

        assert!(var.set_from_string("[Sagittal, axial sagittal]").unwrap());
        assert_eq!(var.export_to_string(), "[sagittal axial]");
        assert_eq!(var.selected_labels(), vec!["Sagittal", "Axial"]);
        assert!(!var
            .set_value(&Variant::StrVec(vec!["SAGITTAL".into(), "axial".into()]))
            .unwrap());

        assert!(matches!(
            var.set_from_string("[axial oblique]"),
            Err(StateError::InvalidOption { .. })
        ));
        assert_eq!(var.export_to_string(), "[sagittal axial]");
        assert!(var.set_from_string("[]").unwrap());
        assert_eq!(var.export_to_string(), "[]");

        let mut copy = StateVariable::multi_option("views", &[], list).unwrap();
        var.set_from_string("[volume coronal]").unwrap();
        assert!(copy.set_from_string(&var.export_to_string()).unwrap());
        assert_eq!(copy.value(), var.value());
    }

    #[test]
    fn locked_rejects_writes() {
        let mut var = StateVariable::new("x", 1).with_locked(true);
        assert_eq!(
            var.set_value(&Variant::Int(2)),
            Err(StateError::Locked("x".into()))
        );
        var.set_locked(false);
        assert!(var.set_value(&Variant::Int(2)).unwrap());
    }

    #[test]
    fn export_import_round_trip() {
        let mut var = StateVariable::new("center", vec![1i64, 2, 3]);
        let text = var.export_to_string();
        assert_eq!(text, "[1 2 3]");
        assert!(!var.set_from_string(&text).unwrap());
        assert!(matches!(
            var.set_from_string("1 2 3"),
            Err(StateError::Conversion { .. })
        ));
    }

    #[test]
    fn unsubscribe_removes_only_that_observer() {
        let mut var = StateVariable::new("x", 1);
        let a = var.subscribe(Arc::new(|_| {}));
        let _b = var.subscribe(Arc::new(|_| {}));
        assert!(var.unsubscribe(a));
        assert!(!var.unsubscribe(a));
        assert_eq!(var.observers().len(), 1);
    }
}
