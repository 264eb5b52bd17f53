diesel::table! {
    accounts (id) {
        id -> Integer,
        username -> Text,
        email -> Text,
        display_name -> Text,
        province -> Text,
        role -> Text,
        password_hash -> Text,
        created_at -> Timestamp,
    }
}

diesel::table! {
    sessions (token) {
        token -> Text,
        account_id -> Integer,
        created_at -> Timestamp,
        expires_at -> Timestamp,
    }
}

diesel::table! {
    floods (id) {
        id -> Integer,
        province -> Text,
        prefecture -> Text,
        sub_prefecture -> Text,
        city -> Text,
        report_date -> Date,
        affected -> Integer,
        households -> Integer,
        missing -> Integer,
        injured -> Integer,
        deaths -> Integer,
        displaced -> Integer,
        houses_destroyed -> Integer,
        houses_damaged -> Integer,
        livestock_lost -> Integer,
        livestock_dead -> Integer,
        flooded_area -> Double,
        description -> Text,
        signer -> Text,
        images -> Text,
        created_by -> Integer,
        created_at -> Timestamp,
    }
}

diesel::table! {
    cholera_reports (id) {
        id -> Integer,
        province -> Text,
        prefecture -> Text,
        sub_prefecture -> Text,
        city -> Text,
        report_date -> Date,
        cases -> Integer,
        deaths -> Integer,
        recovered -> Integer,
        hospitalized -> Integer,
        vaccinated -> Integer,
        discharged -> Integer,
        patients_in_bed -> Integer,
        community_deaths -> Integer,
        description -> Text,
        signer -> Text,
        images -> Text,
        created_by -> Integer,
        created_at -> Timestamp,
    }
}

diesel::table! {
    aid_distributions (id) {
        id -> Integer,
        province -> Text,
        prefecture -> Text,
        sub_prefecture -> Text,
        city -> Text,
        report_date -> Date,
        aid_type -> Text,
        organization -> Text,
        beneficiary_count -> Integer,
        beneficiaries -> Text,
        amount -> Nullable<Double>,
        description -> Text,
        signer -> Text,
        images -> Text,
        created_by -> Integer,
        created_at -> Timestamp,
    }
}

diesel::table! {
    humanitarian_affairs (id) {
        id -> Integer,
        province -> Text,
        prefecture -> Text,
        city -> Text,
        report_date -> Date,
        aid_type -> Text,
        beneficiaries_men -> Integer,
        beneficiaries_women -> Integer,
        beneficiary_type -> Text,
        organization_name -> Text,
        project_name -> Text,
        work_type -> Text,
        description -> Text,
        signer -> Text,
        images -> Text,
        created_by -> Integer,
        created_at -> Timestamp,
    }
}

diesel::table! {
    social_actions (id) {
        id -> Integer,
        province -> Text,
        prefecture -> Text,
        sub_prefecture -> Text,
        city -> Text,
        report_date -> Date,
        action_type -> Text,
        themes -> Text,
        participants_men -> Integer,
        participants_women -> Integer,
        description -> Text,
        signer -> Text,
        images -> Text,
        created_by -> Integer,
        created_at -> Timestamp,
    }
}

diesel::table! {
    news (id) {
        id -> Integer,
        province -> Text,
        report_date -> Date,
        title -> Text,
        description -> Text,
        signer -> Text,
        images -> Text,
        created_by -> Integer,
        created_at -> Timestamp,
    }
}

diesel::joinable!(sessions -> accounts (account_id));

diesel::allow_tables_to_appear_in_same_query!(
    accounts,
    sessions,
    floods,
    cholera_reports,
    aid_distributions,
    humanitarian_affairs,
    social_actions,
    news,
);
