//! Esquema Diesel (declarado a mano). Debe seguir a `migrations/*/up.sql`.

diesel::table! {
    users (id) {
        id -> Int8,
        username -> Varchar,
        email -> Varchar,
        full_name -> Varchar,
        password_hash -> Text,
        role -> Varchar,
        is_active -> Bool,
        department -> Nullable<Varchar>,
        position -> Nullable<Varchar>,
        last_login -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    evaluations (id) {
        id -> Int8,
        evaluation_number -> Varchar,
        evaluation_type -> Varchar,
        product_name -> Varchar,
        part_number -> Varchar,
        evaluator_id -> Int8,
        part_approver_id -> Nullable<Int8>,
        group_approver_id -> Nullable<Int8>,
        status -> Varchar,
        start_date -> Date,
        completion_date -> Nullable<Date>,
        cancel_reason -> Nullable<Text>,
        evaluation_reason -> Nullable<Text>,
        remarks -> Nullable<Text>,
        process_step -> Nullable<Varchar>,
        pgm_version -> Nullable<Varchar>,
        capacity -> Nullable<Varchar>,
        interface_type -> Nullable<Varchar>,
        form_factor -> Nullable<Varchar>,
        scs_charger_name -> Nullable<Varchar>,
        head_office_charger_name -> Nullable<Varchar>,
        version -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    evaluation_details (id) {
        id -> Int8,
        evaluation_id -> Int8,
        detail_type -> Varchar,
        pgm_version_before -> Nullable<Varchar>,
        pgm_version_after -> Nullable<Varchar>,
        material_name -> Nullable<Varchar>,
        material_number -> Nullable<Varchar>,
        equipment_name -> Nullable<Varchar>,
        equipment_number -> Nullable<Varchar>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    evaluation_results (id) {
        id -> Int8,
        evaluation_id -> Int8,
        result_type -> Varchar,
        result_status -> Varchar,
        result_data -> Jsonb,
        test_date -> Nullable<Date>,
        comments -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    evaluation_lots (id) {
        id -> Int8,
        evaluation_id -> Int8,
        process_key -> Nullable<Varchar>,
        process_name -> Nullable<Varchar>,
        process_order_index -> Nullable<Int4>,
        client_id -> Nullable<Varchar>,
        lot_number -> Varchar,
        quantity -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    evaluation_process_steps (id) {
        id -> Int8,
        evaluation_id -> Int8,
        process_key -> Nullable<Varchar>,
        process_name -> Nullable<Varchar>,
        process_order_index -> Nullable<Int4>,
        order_index -> Int4,
        step_code -> Varchar,
        step_label -> Nullable<Varchar>,
        eval_code -> Nullable<Varchar>,
        results_applicable -> Bool,
        total_units_manual -> Bool,
        total_units -> Nullable<Int4>,
        pass_units -> Nullable<Int4>,
        fail_units -> Nullable<Int4>,
        notes -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    evaluation_process_step_lots (step_id, lot_id) {
        step_id -> Int8,
        lot_id -> Int8,
        quantity_override -> Nullable<Int4>,
    }
}

diesel::table! {
    evaluation_process_step_failures (id) {
        id -> Int8,
        step_id -> Int8,
        sequence -> Int4,
        serial_number -> Nullable<Varchar>,
        fail_code_id -> Nullable<Int8>,
        fail_code_text -> Varchar,
        fail_code_name_snapshot -> Nullable<Varchar>,
        analysis_result -> Nullable<Text>,
    }
}

diesel::table! {
    evaluation_process_raw (id) {
        id -> Int8,
        evaluation_id -> Int8,
        payload -> Jsonb,
        source -> Varchar,
        payload_hash -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    evaluation_events (seq) {
        seq -> Int8,
        evaluation_id -> Int8,
        actor_id -> Nullable<Int8>,
        event_type -> Varchar,
        schema_version -> Int4,
        payload -> Jsonb,
        ts -> Timestamptz,
    }
}

diesel::table! {
    fail_codes (id) {
        id -> Int8,
        code -> Varchar,
        short_name -> Nullable<Varchar>,
        description -> Nullable<Text>,
        is_provisional -> Bool,
        source -> Nullable<Varchar>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    comments (id) {
        id -> Int8,
        evaluation_id -> Int8,
        author_id -> Int8,
        parent_comment_id -> Nullable<Int8>,
        depth -> Int4,
        content -> Text,
        is_edited -> Bool,
        edited_at -> Nullable<Timestamptz>,
        is_deleted -> Bool,
        deleted_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    mentions (id) {
        id -> Int8,
        mention_type -> Varchar,
        mentioned_user_id -> Int8,
        mentioner_id -> Int8,
        evaluation_id -> Nullable<Int8>,
        comment_id -> Nullable<Int8>,
        message_id -> Nullable<Int8>,
        context_text -> Text,
        mention_position -> Int4,
        status -> Varchar,
        read_at -> Nullable<Timestamptz>,
        acknowledged_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    messages (id) {
        id -> Int8,
        title -> Varchar,
        content -> Text,
        message_type -> Varchar,
        priority -> Varchar,
        recipient_id -> Int8,
        sender_id -> Nullable<Int8>,
        evaluation_id -> Nullable<Int8>,
        is_read -> Bool,
        read_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    operation_logs (id) {
        id -> Int8,
        user_id -> Nullable<Int8>,
        operation_type -> Varchar,
        target_type -> Varchar,
        target_id -> Nullable<Int8>,
        target_description -> Nullable<Varchar>,
        old_data -> Nullable<Jsonb>,
        new_data -> Nullable<Jsonb>,
        ip_address -> Nullable<Varchar>,
        request_method -> Nullable<Varchar>,
        request_path -> Nullable<Varchar>,
        status_code -> Nullable<Int4>,
        success -> Bool,
        error_message -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    revoked_tokens (jti) {
        jti -> Varchar,
        expires_at -> Timestamptz,
        revoked_at -> Timestamptz,
    }
}

diesel::joinable!(evaluation_details -> evaluations (evaluation_id));
diesel::joinable!(evaluation_results -> evaluations (evaluation_id));
diesel::joinable!(evaluation_lots -> evaluations (evaluation_id));
diesel::joinable!(evaluation_process_steps -> evaluations (evaluation_id));
diesel::joinable!(evaluation_process_step_lots -> evaluation_process_steps (step_id));
diesel::joinable!(evaluation_process_step_lots -> evaluation_lots (lot_id));
diesel::joinable!(evaluation_process_step_failures -> evaluation_process_steps (step_id));
diesel::joinable!(evaluation_process_raw -> evaluations (evaluation_id));
diesel::joinable!(evaluation_events -> evaluations (evaluation_id));
diesel::joinable!(comments -> evaluations (evaluation_id));

diesel::allow_tables_to_appear_in_same_query!(users,
                                              evaluations,
                                              evaluation_details,
                                              evaluation_results,
                                              evaluation_lots,
                                              evaluation_process_steps,
                                              evaluation_process_step_lots,
                                              evaluation_process_step_failures,
                                              evaluation_process_raw,
                                              evaluation_events,
                                              fail_codes,
                                              comments,
                                              mentions,
                                              messages,
                                              operation_logs,
                                              revoked_tokens);
