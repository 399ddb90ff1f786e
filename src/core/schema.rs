diesel::table! {
    tickets (id) {
        id -> Uuid,
        ticket_number -> Text,
        title -> Text,
        description -> Text,
        status -> Text,
        priority -> Text,
        kind -> Text,
        student_id -> Text,
        instructor_id -> Nullable<Text>,
        course_id -> Nullable<Text>,
        category_id -> Nullable<Uuid>,
        metadata -> Jsonb,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        resolved_at -> Nullable<Timestamptz>,
        closed_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    ticket_comments (id) {
        id -> Uuid,
        ticket_id -> Uuid,
        author_id -> Text,
        content -> Text,
        is_internal -> Bool,
        metadata -> Jsonb,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_history (id) {
        id -> Uuid,
        ticket_id -> Uuid,
        actor_id -> Text,
        action -> Text,
        old_value -> Nullable<Text>,
        new_value -> Nullable<Text>,
        description -> Nullable<Text>,
        metadata -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    categories (id) {
        id -> Uuid,
        name -> Text,
        description -> Nullable<Text>,
        color -> Nullable<Text>,
        is_active -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    attachments (id) {
        id -> Uuid,
        ticket_id -> Nullable<Uuid>,
        comment_id -> Nullable<Uuid>,
        file_name -> Text,
        file_url -> Text,
        file_type -> Nullable<Text>,
        uploaded_by -> Text,
        metadata -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(tickets -> categories (category_id));
diesel::joinable!(ticket_comments -> tickets (ticket_id));
diesel::joinable!(ticket_history -> tickets (ticket_id));

diesel::allow_tables_to_appear_in_same_query!(
    tickets,
    ticket_comments,
    ticket_history,
    categories,
    attachments,
);
