/// `persons` -> `person`, `people` -> `person`.
pub fn singularize(word: &str) -> String {
    pluralizer::pluralize(word, 1, false)
}

/// `<singular(table)>_<id>`, the default key pointing at `table`.
pub fn default_key(table: &str, id_attribute: &str) -> String {
    format!("{}_{id_attribute}", singularize(table))
}

/// Default `belongsToMany` join table: both table names sorted and joined with `_`.
pub fn default_join_table(a: &str, b: &str) -> String {
    let mut tables = [a, b];
    tables.sort_unstable();
    tables.join("_")
}

pub fn pivot_alias(relation: &str, table: &str) -> String {
    format!("{relation}_{table}")
}

pub fn through_alias(relation: &str, table: &str) -> String {
    format!("{relation}_{table}_pivot")
}
