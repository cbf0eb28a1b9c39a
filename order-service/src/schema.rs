diesel::table! {
    users (id) {
        id -> Int8,
        user_name -> Varchar,
        user_role -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    items (id) {
        id -> Int8,
        name -> Varchar,
        status -> Varchar,
        unit_price -> Int8,
        stock -> Int8,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    orders (id) {
        id -> Int8,
        user_id -> Int8,
        item_id -> Int8,
        quantity -> Int4,
        total_price -> Int8,
        order_kind -> Varchar,
        created_at -> Timestamptz,
        cancelled_at -> Nullable<Timestamptz>,
    }
}

diesel::joinable!(orders -> items (item_id));
diesel::joinable!(orders -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    items,
    orders,
    users,
);
