use std::{cmp, collections::HashMap, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn apply(self, ordering: cmp::Ordering) -> cmp::Ordering {
        match self {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        }
    }

    fn sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// A column a list endpoint accepts in `?ordering=`.
pub trait OrderField: Copy + PartialEq + fmt::Debug + Send + Sync + 'static {
    fn parse(name: &str) -> Option<Self>;

    /// Fully qualified column, never built from user input.
    fn column(self) -> &'static str;
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy<F> {
    keys: Vec<(F, Direction)>,
}

impl<F: OrderField> OrderBy<F> {
    pub fn new(keys: Vec<(F, Direction)>) -> Self {
        Self { keys }
    }

    /// Parses `ordering=a,-b`. Unknown fields are skipped; when nothing
    /// usable remains the default ordering applies.
    pub fn from_query(params: &HashMap<String, String>, default: &[(F, Direction)]) -> Self {
        let keys: Vec<(F, Direction)> = params
            .get("ordering")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter_map(|name| match name.strip_prefix('-') {
                        Some(name) => F::parse(name).map(|f| (f, Direction::Desc)),
                        None => F::parse(name).map(|f| (f, Direction::Asc)),
                    })
                    .collect()
            })
            .unwrap_or_default();

        if keys.is_empty() {
            return Self::new(default.to_vec());
        }
        Self { keys }
    }

    pub fn keys(&self) -> &[(F, Direction)] {
        &self.keys
    }

    fn tie_break(&self) -> Direction {
        self.keys
            .first()
            .map(|(_, direction)| *direction)
            .unwrap_or(Direction::Asc)
    }

    /// Compares two rows key by key, then by id.
    pub fn compare<T>(
        &self,
        a: &T,
        b: &T,
        by_field: impl Fn(F, &T, &T) -> cmp::Ordering,
        id: impl Fn(&T) -> i64,
    ) -> cmp::Ordering {
        self.keys
            .iter()
            .map(|(field, direction)| direction.apply(by_field(*field, a, b)))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| self.tie_break().apply(id(a).cmp(&id(b))))
    }

    pub fn sort<T>(
        &self,
        rows: &mut [T],
        by_field: impl Fn(F, &T, &T) -> cmp::Ordering,
        id: impl Fn(&T) -> i64,
    ) {
        rows.sort_by(|a, b| self.compare(a, b, &by_field, &id));
    }

    pub fn sql(&self, id_column: &str) -> String {
        let mut parts: Vec<String> = self
            .keys
            .iter()
            .map(|(field, direction)| format!("{} {}", field.column(), direction.sql()))
            .collect();
        parts.push(format!("{id_column} {}", self.tie_break().sql()));
        format!(" ORDER BY {}", parts.join(", "))
    }
}
