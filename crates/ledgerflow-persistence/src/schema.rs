//! Esquema Diesel (mantenido a mano). Reemplazable con `diesel print-schema`.

diesel::table! {
    flow_runs (id) {
        id -> Uuid,
        name -> Text,
        status -> Text,
        input -> Jsonb,
        data -> Nullable<Jsonb>,
        error -> Nullable<Text>,
        started_by -> Nullable<Text>,
        trace_id -> Nullable<Text>,
        config -> Jsonb,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    step_attempts (id) {
        seq -> BigInt,
        id -> Uuid,
        run_id -> Uuid,
        name -> Text,
        attempt -> Integer,
        stage -> Nullable<Text>,
        #[sql_name = "type"]
        step_type -> Text,
        status -> Text,
        value -> Nullable<Jsonb>,
        error -> Nullable<Text>,
        max_retries -> Integer,
        timeout_in_ms -> BigInt,
        ui -> Nullable<Jsonb>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        start_time -> Nullable<Timestamptz>,
        end_time -> Nullable<Timestamptz>,
        retry_at -> Nullable<Timestamptz>,
    }
}

diesel::joinable!(step_attempts -> flow_runs (run_id));

diesel::allow_tables_to_appear_in_same_query!(flow_runs, step_attempts);
