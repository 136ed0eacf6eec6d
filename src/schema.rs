// Workbranch schema - branch workflow tables for Diesel ORM

diesel::table! {
    schema_versions (id) {
        id -> Integer,
        version -> Text,
        name -> Text,
        features -> Text,
        introduced_at -> Text,
    }
}

diesel::table! {
    branches (id) {
        id -> Integer,
        project_id -> Text,
        name -> Text,
        branch_type -> Text,
        status -> Text,
        staged_files -> Text,
        ahead_commits -> Integer,
        behind_commits -> Integer,
        last_test_run_id -> Nullable<Integer>,
        is_current -> Bool,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    test_runs (id) {
        id -> Integer,
        project_id -> Text,
        branch_id -> Integer,
        status -> Text,
        summary -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    agent_goals (id) {
        id -> Integer,
        project_id -> Text,
        branch_id -> Integer,
        description -> Text,
        status -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}
