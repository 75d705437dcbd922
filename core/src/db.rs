use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::Local;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::PipelineError;
use crate::models::{
    DietGoal, DietPlan, DietPlanDetail, DietPlanItem, GoalType, Ingredient, IngredientCategory,
    MedicalCondition, NewDietGoal, NewDietPlan, NewDietPlanItem, NewIngredient,
    NewMedicalCondition, NewProfile, NewUser, Preferences, Profile, UpdateDietGoal,
    UpdateDietPlan, UpdateMedicalCondition, UpdatePreferences, UpdateProfile, User,
    UserCredentials, bmi, scale_per_100g,
};

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    #[allow(clippy::too_many_lines)]
    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                    password_hash TEXT NOT NULL,
                    first_name TEXT NOT NULL DEFAULT '',
                    last_name TEXT NOT NULL DEFAULT '',
                    is_active INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS user_profiles (
                    user_id INTEGER PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
                    age INTEGER NOT NULL CHECK (age > 0),
                    weight REAL NOT NULL CHECK (weight > 0 AND weight < 1000),
                    height REAL NOT NULL CHECK (height > 0 AND height < 1000),
                    sex TEXT NOT NULL CHECK (sex IN ('male', 'female', 'other')),
                    activity_level TEXT NOT NULL CHECK (activity_level IN
                        ('sedentary', 'light', 'moderate', 'active', 'very_active')),
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS medical_conditions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    condition_name TEXT NOT NULL,
                    severity TEXT NOT NULL DEFAULT 'moderate'
                        CHECK (severity IN ('mild', 'moderate', 'severe')),
                    notes TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL,
                    UNIQUE (user_id, condition_name)
                );

                CREATE TABLE IF NOT EXISTS user_preferences (
                    user_id INTEGER PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
                    dietary_type TEXT NOT NULL DEFAULT 'none' CHECK (dietary_type IN
                        ('none', 'vegetarian', 'vegan', 'keto', 'paleo', 'mediterranean')),
                    allergies TEXT NOT NULL DEFAULT '[]',
                    disliked_foods TEXT NOT NULL DEFAULT '[]',
                    preferred_cuisines TEXT NOT NULL DEFAULT '[]',
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS diet_goals (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    goal_type TEXT NOT NULL CHECK (goal_type IN
                        ('lose_weight', 'gain_weight', 'maintain', 'muscle_gain', 'health_management')),
                    target_weight REAL,
                    target_date TEXT,
                    calorie_target INTEGER NOT NULL CHECK (calorie_target > 0),
                    is_active INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS ingredients (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    category TEXT NOT NULL CHECK (category IN
                        ('protein', 'carbs', 'vegetables', 'fruits', 'dairy', 'fats', 'grains', 'nuts', 'other')),
                    calories_per_100g REAL NOT NULL CHECK (calories_per_100g >= 0),
                    protein_per_100g REAL NOT NULL CHECK (protein_per_100g >= 0),
                    carbs_per_100g REAL NOT NULL CHECK (carbs_per_100g >= 0),
                    fat_per_100g REAL NOT NULL CHECK (fat_per_100g >= 0),
                    fiber_per_100g REAL NOT NULL DEFAULT 0 CHECK (fiber_per_100g >= 0),
                    image_url TEXT NOT NULL DEFAULT '',
                    is_vegetarian INTEGER NOT NULL DEFAULT 0,
                    is_vegan INTEGER NOT NULL DEFAULT 0,
                    common_allergens TEXT NOT NULL DEFAULT '[]',
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS diet_plans (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    goal_id INTEGER REFERENCES diet_goals(id) ON DELETE SET NULL,
                    plan_name TEXT NOT NULL,
                    ai_description TEXT NOT NULL DEFAULT '',
                    total_calories INTEGER NOT NULL,
                    total_protein REAL NOT NULL,
                    total_carbs REAL NOT NULL,
                    total_fat REAL NOT NULL,
                    is_favorite INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS diet_plan_items (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    diet_plan_id INTEGER NOT NULL REFERENCES diet_plans(id) ON DELETE CASCADE,
                    ingredient_id INTEGER NOT NULL REFERENCES ingredients(id),
                    quantity_grams REAL NOT NULL CHECK (quantity_grams > 0),
                    meal_type TEXT NOT NULL CHECK (meal_type IN ('breakfast', 'lunch', 'dinner', 'snack')),
                    ai_description TEXT NOT NULL DEFAULT '',
                    preparation_notes TEXT NOT NULL DEFAULT '',
                    order_index INTEGER NOT NULL DEFAULT 0
                );

                CREATE INDEX IF NOT EXISTS idx_medical_conditions_user ON medical_conditions(user_id);
                CREATE INDEX IF NOT EXISTS idx_diet_goals_user ON diet_goals(user_id);
                CREATE INDEX IF NOT EXISTS idx_ingredients_name ON ingredients(name);
                CREATE INDEX IF NOT EXISTS idx_diet_plans_user ON diet_plans(user_id);
                CREATE INDEX IF NOT EXISTS idx_diet_plan_items_plan ON diet_plan_items(diet_plan_id);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn enum_column<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        let raw: String = row.get(idx)?;
        raw.parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    }

    fn list_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Vec<String>> {
        let raw: String = row.get(idx)?;
        serde_json::from_str(&raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    }

    fn list_param(values: &[String]) -> Result<String> {
        serde_json::to_string(values).context("Failed to encode string list")
    }

    fn user_from_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            first_name: row.get(2)?,
            last_name: row.get(3)?,
            is_active: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    // Expects: 0: p.user_id, 1: u.email, 2: age, 3: weight, 4: height, 5: sex,
    // 6: activity_level, 7: created_at, 8: updated_at
    fn profile_from_row(row: &rusqlite::Row) -> rusqlite::Result<Profile> {
        let weight: f64 = row.get(3)?;
        let height: f64 = row.get(4)?;
        Ok(Profile {
            user: row.get(0)?,
            email: row.get(1)?,
            age: row.get(2)?,
            weight,
            height,
            sex: Self::enum_column(row, 5)?,
            activity_level: Self::enum_column(row, 6)?,
            bmi: bmi(weight, height),
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn condition_from_row(row: &rusqlite::Row) -> rusqlite::Result<MedicalCondition> {
        Ok(MedicalCondition {
            id: row.get(0)?,
            user: row.get(1)?,
            condition_name: row.get(2)?,
            severity: Self::enum_column(row, 3)?,
            notes: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn preferences_from_row(row: &rusqlite::Row) -> rusqlite::Result<Preferences> {
        Ok(Preferences {
            user: row.get(0)?,
            dietary_type: Self::enum_column(row, 1)?,
            allergies: Self::list_column(row, 2)?,
            disliked_foods: Self::list_column(row, 3)?,
            preferred_cuisines: Self::list_column(row, 4)?,
            updated_at: row.get(5)?,
        })
    }

    fn goal_from_row(row: &rusqlite::Row) -> rusqlite::Result<DietGoal> {
        let goal_type: GoalType = Self::enum_column(row, 2)?;
        Ok(DietGoal {
            id: row.get(0)?,
            user: row.get(1)?,
            goal_type,
            goal_type_display: goal_type.label(),
            target_weight: row.get(3)?,
            target_date: row.get(4)?,
            calorie_target: row.get(5)?,
            is_active: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    // Expects the ingredient columns starting at `offset`, in table order
    // without created_at.
    fn ingredient_at(row: &rusqlite::Row, offset: usize) -> rusqlite::Result<Ingredient> {
        Ok(Ingredient {
            id: row.get(offset)?,
            name: row.get(offset + 1)?,
            category: Self::enum_column(row, offset + 2)?,
            calories_per_100g: row.get(offset + 3)?,
            protein_per_100g: row.get(offset + 4)?,
            carbs_per_100g: row.get(offset + 5)?,
            fat_per_100g: row.get(offset + 6)?,
            fiber_per_100g: row.get(offset + 7)?,
            image_url: row.get(offset + 8)?,
            is_vegetarian: row.get(offset + 9)?,
            is_vegan: row.get(offset + 10)?,
            common_allergens: Self::list_column(row, offset + 11)?,
        })
    }

    fn ingredient_from_row(row: &rusqlite::Row) -> rusqlite::Result<Ingredient> {
        Self::ingredient_at(row, 0)
    }

    fn plan_from_row(row: &rusqlite::Row) -> rusqlite::Result<DietPlan> {
        Ok(DietPlan {
            id: row.get(0)?,
            user: row.get(1)?,
            goal: row.get(2)?,
            plan_name: row.get(3)?,
            ai_description: row.get(4)?,
            total_calories: row.get(5)?,
            total_protein: row.get(6)?,
            total_carbs: row.get(7)?,
            total_fat: row.get(8)?,
            is_favorite: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    // Expects:
    // 0: dpi.id, 1: dpi.quantity_grams, 2: dpi.meal_type, 3: dpi.ai_description,
    // 4: dpi.preparation_notes, 5: dpi.order_index, 6..: ingredient columns
    fn plan_item_from_row(row: &rusqlite::Row) -> rusqlite::Result<DietPlanItem> {
        let quantity_grams: f64 = row.get(1)?;
        let ingredient = Self::ingredient_at(row, 6)?;
        Ok(DietPlanItem {
            id: row.get(0)?,
            quantity_grams,
            meal_type: Self::enum_column(row, 2)?,
            ai_description: row.get(3)?,
            preparation_notes: row.get(4)?,
            order_index: row.get(5)?,
            calories: scale_per_100g(ingredient.calories_per_100g, quantity_grams),
            protein: scale_per_100g(ingredient.protein_per_100g, quantity_grams),
            carbs: scale_per_100g(ingredient.carbs_per_100g, quantity_grams),
            fat: scale_per_100g(ingredient.fat_per_100g, quantity_grams),
            ingredient,
        })
    }

    // --- Users ---

    pub fn create_user(&self, user: &NewUser) -> Result<User> {
        let now = Local::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO users (email, password_hash, first_name, last_name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    user.email.trim().to_lowercase(),
                    user.password_hash,
                    user.first_name,
                    user.last_name,
                    now,
                ],
            )
            .context("Failed to create user")?;
        let id = self.conn.last_insert_rowid();
        self.get_user(id)?.context("User not found")
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, email, first_name, last_name, is_active, created_at
                 FROM users WHERE id = ?1",
                params![id],
                Self::user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn email_exists(&self, email: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM users WHERE email = ?1",
            params![email.trim().to_lowercase()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn get_user_credentials(&self, email: &str) -> Result<Option<UserCredentials>> {
        let creds = self
            .conn
            .query_row(
                "SELECT id, email, first_name, last_name, is_active, created_at, password_hash
                 FROM users WHERE email = ?1",
                params![email.trim().to_lowercase()],
                |row| {
                    Ok(UserCredentials {
                        user: Self::user_from_row(row)?,
                        password_hash: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(creds)
    }

    pub fn set_user_active(&self, id: i64, active: bool) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE users SET is_active = ?1 WHERE id = ?2",
            params![active, id],
        )?;
        Ok(rows > 0)
    }

    // --- Profiles ---

    const PROFILE_SELECT: &'static str =
        "SELECT p.user_id, u.email, p.age, p.weight, p.height, p.sex, p.activity_level,
                p.created_at, p.updated_at
         FROM user_profiles p
         JOIN users u ON u.id = p.user_id";

    pub fn create_profile(&self, user_id: i64, profile: &NewProfile) -> Result<Profile> {
        let now = Local::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO user_profiles (user_id, age, weight, height, sex, activity_level, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    user_id,
                    profile.age,
                    profile.weight,
                    profile.height,
                    profile.sex.as_ref(),
                    profile.activity_level.as_ref(),
                    now,
                    now,
                ],
            )
            .context("Failed to create profile")?;
        self.get_profile(user_id)?.context("Profile not found")
    }

    pub fn get_profile(&self, user_id: i64) -> Result<Option<Profile>> {
        let profile = self
            .conn
            .query_row(
                &format!("{} WHERE p.user_id = ?1", Self::PROFILE_SELECT),
                params![user_id],
                Self::profile_from_row,
            )
            .optional()?;
        Ok(profile)
    }

    pub fn update_profile(&self, user_id: i64, update: &UpdateProfile) -> Result<Option<Profile>> {
        if self.get_profile(user_id)?.is_none() {
            return Ok(None);
        }

        let now = Local::now().to_rfc3339();
        if let Some(age) = update.age {
            self.conn.execute(
                "UPDATE user_profiles SET age = ?1, updated_at = ?2 WHERE user_id = ?3",
                params![age, now, user_id],
            )?;
        }
        if let Some(weight) = update.weight {
            self.conn.execute(
                "UPDATE user_profiles SET weight = ?1, updated_at = ?2 WHERE user_id = ?3",
                params![weight, now, user_id],
            )?;
        }
        if let Some(height) = update.height {
            self.conn.execute(
                "UPDATE user_profiles SET height = ?1, updated_at = ?2 WHERE user_id = ?3",
                params![height, now, user_id],
            )?;
        }
        if let Some(sex) = update.sex {
            self.conn.execute(
                "UPDATE user_profiles SET sex = ?1, updated_at = ?2 WHERE user_id = ?3",
                params![sex.as_ref(), now, user_id],
            )?;
        }
        if let Some(level) = update.activity_level {
            self.conn.execute(
                "UPDATE user_profiles SET activity_level = ?1, updated_at = ?2 WHERE user_id = ?3",
                params![level.as_ref(), now, user_id],
            )?;
        }

        self.get_profile(user_id)
    }

    // --- Medical conditions ---

    pub fn list_conditions(&self, user_id: i64) -> Result<Vec<MedicalCondition>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, condition_name, severity, notes, created_at
             FROM medical_conditions WHERE user_id = ?1 ORDER BY condition_name",
        )?;
        let conditions = stmt
            .query_map(params![user_id], Self::condition_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(conditions)
    }

    pub fn get_condition(&self, user_id: i64, id: i64) -> Result<Option<MedicalCondition>> {
        let condition = self
            .conn
            .query_row(
                "SELECT id, user_id, condition_name, severity, notes, created_at
                 FROM medical_conditions WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                Self::condition_from_row,
            )
            .optional()?;
        Ok(condition)
    }

    /// Whether the user already has a condition with this name, ignoring `except_id`.
    pub fn condition_name_taken(
        &self,
        user_id: i64,
        name: &str,
        except_id: Option<i64>,
    ) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM medical_conditions
             WHERE user_id = ?1 AND condition_name = ?2 AND id IS NOT ?3",
            params![user_id, name, except_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn create_condition(
        &self,
        user_id: i64,
        condition: &NewMedicalCondition,
    ) -> Result<MedicalCondition> {
        let now = Local::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO medical_conditions (user_id, condition_name, severity, notes, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    user_id,
                    condition.condition_name,
                    condition.severity.as_ref(),
                    condition.notes,
                    now,
                ],
            )
            .context("Failed to create medical condition")?;
        let id = self.conn.last_insert_rowid();
        self.get_condition(user_id, id)?
            .context("Medical condition not found")
    }

    pub fn update_condition(
        &self,
        user_id: i64,
        id: i64,
        update: &UpdateMedicalCondition,
    ) -> Result<Option<MedicalCondition>> {
        if self.get_condition(user_id, id)?.is_none() {
            return Ok(None);
        }
        if let Some(ref name) = update.condition_name {
            self.conn.execute(
                "UPDATE medical_conditions SET condition_name = ?1 WHERE id = ?2",
                params![name, id],
            )?;
        }
        if let Some(severity) = update.severity {
            self.conn.execute(
                "UPDATE medical_conditions SET severity = ?1 WHERE id = ?2",
                params![severity.as_ref(), id],
            )?;
        }
        if let Some(ref notes) = update.notes {
            self.conn.execute(
                "UPDATE medical_conditions SET notes = ?1 WHERE id = ?2",
                params![notes, id],
            )?;
        }
        self.get_condition(user_id, id)
    }

    pub fn delete_condition(&self, user_id: i64, id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM medical_conditions WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(rows > 0)
    }

    // --- Preferences ---

    pub fn get_preferences(&self, user_id: i64) -> Result<Option<Preferences>> {
        let prefs = self
            .conn
            .query_row(
                "SELECT user_id, dietary_type, allergies, disliked_foods, preferred_cuisines, updated_at
                 FROM user_preferences WHERE user_id = ?1",
                params![user_id],
                Self::preferences_from_row,
            )
            .optional()?;
        Ok(prefs)
    }

    pub fn get_or_create_preferences(&self, user_id: i64) -> Result<Preferences> {
        if let Some(prefs) = self.get_preferences(user_id)? {
            return Ok(prefs);
        }
        let now = Local::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO user_preferences (user_id, updated_at) VALUES (?1, ?2)",
                params![user_id, now],
            )
            .context("Failed to create preferences")?;
        self.get_preferences(user_id)?
            .context("Preferences not found")
    }

    pub fn update_preferences(
        &self,
        user_id: i64,
        update: &UpdatePreferences,
    ) -> Result<Preferences> {
        self.get_or_create_preferences(user_id)?;

        let now = Local::now().to_rfc3339();
        if let Some(dietary_type) = update.dietary_type {
            self.conn.execute(
                "UPDATE user_preferences SET dietary_type = ?1, updated_at = ?2 WHERE user_id = ?3",
                params![dietary_type.as_ref(), now, user_id],
            )?;
        }
        let lists = [
            ("allergies", &update.allergies),
            ("disliked_foods", &update.disliked_foods),
            ("preferred_cuisines", &update.preferred_cuisines),
        ];
        for (column, values) in lists {
            if let Some(values) = values {
                self.conn.execute(
                    &format!(
                        "UPDATE user_preferences SET {column} = ?1, updated_at = ?2 WHERE user_id = ?3"
                    ),
                    params![Self::list_param(values)?, now, user_id],
                )?;
            }
        }

        self.get_preferences(user_id)?
            .context("Preferences not found")
    }

    // --- Diet goals ---

    pub fn list_goals(&self, user_id: i64) -> Result<Vec<DietGoal>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, goal_type, target_weight, target_date, calorie_target, is_active, created_at
             FROM diet_goals WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
        )?;
        let goals = stmt
            .query_map(params![user_id], Self::goal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(goals)
    }

    pub fn get_goal(&self, user_id: i64, id: i64) -> Result<Option<DietGoal>> {
        let goal = self
            .conn
            .query_row(
                "SELECT id, user_id, goal_type, target_weight, target_date, calorie_target, is_active, created_at
                 FROM diet_goals WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                Self::goal_from_row,
            )
            .optional()?;
        Ok(goal)
    }

    /// The user's most recently created active goal.
    pub fn get_active_goal(&self, user_id: i64) -> Result<Option<DietGoal>> {
        let goal = self
            .conn
            .query_row(
                "SELECT id, user_id, goal_type, target_weight, target_date, calorie_target, is_active, created_at
                 FROM diet_goals WHERE user_id = ?1 AND is_active = 1
                 ORDER BY created_at DESC, id DESC LIMIT 1",
                params![user_id],
                Self::goal_from_row,
            )
            .optional()?;
        Ok(goal)
    }

    pub fn create_goal(&self, user_id: i64, goal: &NewDietGoal) -> Result<DietGoal> {
        let now = Local::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO diet_goals (user_id, goal_type, target_weight, target_date, calorie_target, is_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    user_id,
                    goal.goal_type.as_ref(),
                    goal.target_weight,
                    goal.target_date.map(|d| d.format("%Y-%m-%d").to_string()),
                    goal.calorie_target,
                    goal.is_active,
                    now,
                ],
            )
            .context("Failed to create diet goal")?;
        let id = self.conn.last_insert_rowid();
        self.get_goal(user_id, id)?.context("Diet goal not found")
    }

    pub fn update_goal(
        &self,
        user_id: i64,
        id: i64,
        update: &UpdateDietGoal,
    ) -> Result<Option<DietGoal>> {
        if self.get_goal(user_id, id)?.is_none() {
            return Ok(None);
        }
        if let Some(goal_type) = update.goal_type {
            self.conn.execute(
                "UPDATE diet_goals SET goal_type = ?1 WHERE id = ?2",
                params![goal_type.as_ref(), id],
            )?;
        }
        if let Some(target_weight) = update.target_weight {
            self.conn.execute(
                "UPDATE diet_goals SET target_weight = ?1 WHERE id = ?2",
                params![target_weight, id],
            )?;
        }
        if let Some(target_date) = update.target_date {
            self.conn.execute(
                "UPDATE diet_goals SET target_date = ?1 WHERE id = ?2",
                params![target_date.map(|d| d.format("%Y-%m-%d").to_string()), id],
            )?;
        }
        if let Some(calorie_target) = update.calorie_target {
            self.conn.execute(
                "UPDATE diet_goals SET calorie_target = ?1 WHERE id = ?2",
                params![calorie_target, id],
            )?;
        }
        if let Some(is_active) = update.is_active {
            self.conn.execute(
                "UPDATE diet_goals SET is_active = ?1 WHERE id = ?2",
                params![is_active, id],
            )?;
        }
        self.get_goal(user_id, id)
    }

    pub fn delete_goal(&self, user_id: i64, id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM diet_goals WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(rows > 0)
    }

    // --- Ingredients ---

    const INGREDIENT_COLUMNS: &'static str = "id, name, category, calories_per_100g, protein_per_100g, carbs_per_100g,
         fat_per_100g, fiber_per_100g, image_url, is_vegetarian, is_vegan, common_allergens";

    pub fn insert_ingredient(&self, ingredient: &NewIngredient) -> Result<Ingredient> {
        let now = Local::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO ingredients (name, category, calories_per_100g, protein_per_100g, carbs_per_100g,
                     fat_per_100g, fiber_per_100g, image_url, is_vegetarian, is_vegan, common_allergens, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    ingredient.name,
                    ingredient.category.as_ref(),
                    ingredient.calories_per_100g,
                    ingredient.protein_per_100g,
                    ingredient.carbs_per_100g,
                    ingredient.fat_per_100g,
                    ingredient.fiber_per_100g,
                    ingredient.image_url,
                    ingredient.is_vegetarian,
                    ingredient.is_vegan,
                    Self::list_param(&ingredient.common_allergens)?,
                    now,
                ],
            )
            .with_context(|| format!("Failed to insert ingredient '{}'", ingredient.name))?;
        let id = self.conn.last_insert_rowid();
        self.get_ingredient(id)?.context("Ingredient not found")
    }

    pub fn get_ingredient(&self, id: i64) -> Result<Option<Ingredient>> {
        let ingredient = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM ingredients WHERE id = ?1",
                    Self::INGREDIENT_COLUMNS
                ),
                params![id],
                Self::ingredient_from_row,
            )
            .optional()?;
        Ok(ingredient)
    }

    pub fn get_ingredient_by_name(&self, name: &str) -> Result<Option<Ingredient>> {
        let ingredient = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM ingredients WHERE name = ?1",
                    Self::INGREDIENT_COLUMNS
                ),
                params![name],
                Self::ingredient_from_row,
            )
            .optional()?;
        Ok(ingredient)
    }

    /// Insert the ingredient unless one with the same name exists. Returns the
    /// stored row and whether it was created.
    pub fn upsert_ingredient_by_name(&self, ingredient: &NewIngredient) -> Result<(Ingredient, bool)> {
        if let Some(existing) = self.get_ingredient_by_name(&ingredient.name)? {
            return Ok((existing, false));
        }
        Ok((self.insert_ingredient(ingredient)?, true))
    }

    /// Catalog listing by name with an optional case-insensitive name search
    /// and category filter.
    pub fn list_ingredients(
        &self,
        search: Option<&str>,
        category: Option<IngredientCategory>,
    ) -> Result<Vec<Ingredient>> {
        let pattern = search.filter(|q| !q.is_empty()).map(|query| {
            let escaped = query
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            format!("%{escaped}%")
        });
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM ingredients
             WHERE (?1 IS NULL OR name LIKE ?1 ESCAPE '\\')
               AND (?2 IS NULL OR category = ?2)
             ORDER BY name",
            Self::INGREDIENT_COLUMNS
        ))?;
        let ingredients = stmt
            .query_map(
                params![pattern, category.map(|c| c.as_ref().to_string())],
                Self::ingredient_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ingredients)
    }

    pub fn all_ingredients(&self) -> Result<Vec<Ingredient>> {
        self.list_ingredients(None, None)
    }

    // --- Diet plans ---

    const PLAN_SELECT: &'static str = "SELECT id, user_id, goal_id, plan_name, ai_description, total_calories,
                total_protein, total_carbs, total_fat, is_favorite, created_at
         FROM diet_plans";

    fn insert_plan_row(&self, user_id: i64, plan: &NewDietPlan) -> Result<i64> {
        let now = Local::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO diet_plans (user_id, goal_id, plan_name, ai_description, total_calories,
                     total_protein, total_carbs, total_fat, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    user_id,
                    plan.goal,
                    plan.plan_name,
                    plan.ai_description,
                    plan.targets.calories,
                    plan.targets.protein,
                    plan.targets.carbs,
                    plan.targets.fat,
                    now,
                ],
            )
            .context("insert diet plan")?;
        Ok(self.conn.last_insert_rowid())
    }

    fn insert_plan_item(&self, plan_id: i64, item: &NewDietPlanItem) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO diet_plan_items (diet_plan_id, ingredient_id, quantity_grams, meal_type,
                     ai_description, order_index)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    plan_id,
                    item.ingredient_id,
                    item.quantity_grams,
                    item.meal_type.as_ref(),
                    item.ai_description,
                    item.order_index,
                ],
            )
            .with_context(|| format!("insert item for ingredient {}", item.ingredient_id))?;
        Ok(())
    }

    /// Store a plan without items.
    pub fn insert_plan(&self, user_id: i64, plan: &NewDietPlan) -> Result<DietPlanDetail> {
        let id = self.insert_plan_row(user_id, plan)?;
        self.get_plan(user_id, id)?.context("Diet plan not found")
    }

    /// Store a plan and all of its items atomically.
    ///
    /// Every item's ingredient must exist; the first unknown id aborts the
    /// whole write with [`PipelineError::IngredientNotFound`] and nothing is
    /// committed.
    pub fn create_plan_with_items(
        &self,
        user_id: i64,
        plan: &NewDietPlan,
        items: &[NewDietPlanItem],
    ) -> Result<DietPlanDetail, PipelineError> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| PipelineError::persistence(&anyhow::Error::from(e)))?;

        let plan_id = self
            .insert_plan_row(user_id, plan)
            .map_err(|e| PipelineError::persistence(&e))?;
        for item in items {
            let exists = self
                .get_ingredient(item.ingredient_id)
                .map_err(|e| PipelineError::persistence(&e))?
                .is_some();
            if !exists {
                // Dropping `tx` rolls back the plan row and any items so far.
                return Err(PipelineError::IngredientNotFound(item.ingredient_id));
            }
            self.insert_plan_item(plan_id, item)
                .map_err(|e| PipelineError::persistence(&e))?;
        }

        tx.commit()
            .map_err(|e| PipelineError::persistence(&anyhow::Error::from(e)))?;
        tracing::info!(plan_id, items = items.len(), "diet plan stored");

        self.get_plan(user_id, plan_id)
            .and_then(|p| p.context("Diet plan not found"))
            .map_err(|e| PipelineError::persistence(&e))
    }

    pub fn list_plans(&self, user_id: i64) -> Result<Vec<DietPlan>> {
        let mut stmt = self.conn.prepare(&format!(
            "{} WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
            Self::PLAN_SELECT
        ))?;
        let plans = stmt
            .query_map(params![user_id], Self::plan_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(plans)
    }

    pub fn get_plan(&self, user_id: i64, id: i64) -> Result<Option<DietPlanDetail>> {
        let plan = self
            .conn
            .query_row(
                &format!("{} WHERE id = ?1 AND user_id = ?2", Self::PLAN_SELECT),
                params![id, user_id],
                Self::plan_from_row,
            )
            .optional()?;
        match plan {
            Some(plan) => {
                let items = self.get_plan_items(plan.id)?;
                Ok(Some(DietPlanDetail { plan, items }))
            }
            None => Ok(None),
        }
    }

    pub fn get_plan_items(&self, plan_id: i64) -> Result<Vec<DietPlanItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT dpi.id, dpi.quantity_grams, dpi.meal_type, dpi.ai_description,
                    dpi.preparation_notes, dpi.order_index,
                    i.id, i.name, i.category, i.calories_per_100g, i.protein_per_100g,
                    i.carbs_per_100g, i.fat_per_100g, i.fiber_per_100g, i.image_url,
                    i.is_vegetarian, i.is_vegan, i.common_allergens
             FROM diet_plan_items dpi
             JOIN ingredients i ON i.id = dpi.ingredient_id
             WHERE dpi.diet_plan_id = ?1
             ORDER BY CASE dpi.meal_type
                        WHEN 'breakfast' THEN 0
                        WHEN 'lunch' THEN 1
                        WHEN 'dinner' THEN 2
                        ELSE 3
                      END,
                      dpi.order_index, dpi.id",
        )?;
        let items = stmt
            .query_map(params![plan_id], Self::plan_item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    pub fn update_plan(
        &self,
        user_id: i64,
        id: i64,
        update: &UpdateDietPlan,
    ) -> Result<Option<DietPlanDetail>> {
        if self.get_plan(user_id, id)?.is_none() {
            return Ok(None);
        }
        if let Some(goal) = update.goal {
            self.conn.execute(
                "UPDATE diet_plans SET goal_id = ?1 WHERE id = ?2",
                params![goal, id],
            )?;
        }
        if let Some(ref name) = update.plan_name {
            self.conn.execute(
                "UPDATE diet_plans SET plan_name = ?1 WHERE id = ?2",
                params![name, id],
            )?;
        }
        if let Some(ref description) = update.ai_description {
            self.conn.execute(
                "UPDATE diet_plans SET ai_description = ?1 WHERE id = ?2",
                params![description, id],
            )?;
        }
        if let Some(is_favorite) = update.is_favorite {
            self.conn.execute(
                "UPDATE diet_plans SET is_favorite = ?1 WHERE id = ?2",
                params![is_favorite, id],
            )?;
        }
        self.get_plan(user_id, id)
    }

    pub fn delete_plan(&self, user_id: i64, id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM diet_plans WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ActivityLevel, DietaryType, MealType, NutritionTargets, Severity, Sex,
    };
    use chrono::NaiveDate;

    fn count(db: &Database, table: &str) -> i64 {
        db.conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })
            .unwrap()
    }

    fn sample_user(db: &Database, email: &str) -> User {
        db.create_user(&NewUser {
            email: email.to_string(),
            password_hash: "hash".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
        })
        .unwrap()
    }

    fn sample_ingredient(name: &str, calories: f64) -> NewIngredient {
        NewIngredient {
            name: name.to_string(),
            category: IngredientCategory::Protein,
            calories_per_100g: calories,
            protein_per_100g: 20.0,
            carbs_per_100g: 10.0,
            fat_per_100g: 5.0,
            fiber_per_100g: 0.0,
            image_url: String::new(),
            is_vegetarian: true,
            is_vegan: false,
            common_allergens: vec!["dairy".to_string()],
        }
    }

    fn plan(goal: Option<i64>) -> NewDietPlan {
        NewDietPlan {
            goal,
            plan_name: "Balanced".to_string(),
            ai_description: "A balanced day".to_string(),
            targets: NutritionTargets {
                calories: 2628,
                protein: 164,
                carbs: 295,
                fat: 87,
            },
        }
    }

    fn item(ingredient_id: i64, grams: f64, meal_type: MealType, order: i64) -> NewDietPlanItem {
        NewDietPlanItem {
            ingredient_id,
            quantity_grams: grams,
            meal_type,
            ai_description: "good".to_string(),
            order_index: order,
        }
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        let version: i64 = db
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nutrifit.db");
        {
            let db = Database::open(&path).unwrap();
            sample_user(&db, "disk@example.com");
        }
        let db = Database::open(&path).unwrap();
        assert!(db.email_exists("disk@example.com").unwrap());
    }

    #[test]
    fn test_user_email_is_normalized() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user(&db, "  Ada@Example.COM ");
        assert_eq!(user.email, "ada@example.com");
        assert!(user.is_active);
        assert!(db.email_exists("ADA@example.com").unwrap());

        let creds = db.get_user_credentials("ada@EXAMPLE.com").unwrap().unwrap();
        assert_eq!(creds.user.id, user.id);
        assert_eq!(creds.password_hash, "hash");

        assert!(db.create_user(&NewUser {
            email: "ada@example.com".to_string(),
            password_hash: "x".to_string(),
            first_name: String::new(),
            last_name: String::new(),
        })
        .is_err());
    }

    #[test]
    fn test_set_user_active() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user(&db, "a@example.com");
        assert!(db.set_user_active(user.id, false).unwrap());
        assert!(!db.get_user(user.id).unwrap().unwrap().is_active);
        assert!(!db.set_user_active(999, false).unwrap());
    }

    #[test]
    fn test_profile_crud() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user(&db, "a@example.com");
        assert!(db.get_profile(user.id).unwrap().is_none());

        let profile = db
            .create_profile(
                user.id,
                &NewProfile {
                    age: 30,
                    weight: 70.0,
                    height: 175.0,
                    sex: Sex::Male,
                    activity_level: ActivityLevel::Moderate,
                },
            )
            .unwrap();
        assert_eq!(profile.email, "a@example.com");
        assert!((profile.bmi - 22.857).abs() < 0.001);

        let updated = db
            .update_profile(
                user.id,
                &UpdateProfile {
                    weight: Some(80.0),
                    activity_level: Some(ActivityLevel::Active),
                    ..UpdateProfile::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.age, 30);
        assert!((updated.weight - 80.0).abs() < f64::EPSILON);
        assert_eq!(updated.activity_level, ActivityLevel::Active);

        let other = sample_user(&db, "b@example.com");
        assert!(
            db.update_profile(other.id, &UpdateProfile::default())
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_profile_is_one_per_user_and_checked() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user(&db, "a@example.com");
        let new = NewProfile {
            age: 30,
            weight: 70.0,
            height: 175.0,
            sex: Sex::Female,
            activity_level: ActivityLevel::Light,
        };
        db.create_profile(user.id, &new).unwrap();
        assert!(db.create_profile(user.id, &new).is_err());

        let other = sample_user(&db, "b@example.com");
        let bad = NewProfile { weight: 0.0, ..new };
        assert!(db.create_profile(other.id, &bad).is_err());
    }

    #[test]
    fn test_condition_crud_and_uniqueness() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user(&db, "a@example.com");
        let other = sample_user(&db, "b@example.com");

        let cond = db
            .create_condition(
                user.id,
                &NewMedicalCondition {
                    condition_name: "hypertension".to_string(),
                    severity: Severity::default(),
                    notes: String::new(),
                },
            )
            .unwrap();
        assert_eq!(cond.severity, Severity::Moderate);
        assert!(db.condition_name_taken(user.id, "hypertension", None).unwrap());
        assert!(!db
            .condition_name_taken(user.id, "hypertension", Some(cond.id))
            .unwrap());
        assert!(!db.condition_name_taken(other.id, "hypertension", None).unwrap());

        let dup = NewMedicalCondition {
            condition_name: "hypertension".to_string(),
            severity: Severity::Mild,
            notes: String::new(),
        };
        assert!(db.create_condition(user.id, &dup).is_err());
        db.create_condition(other.id, &dup).unwrap();

        let updated = db
            .update_condition(
                user.id,
                cond.id,
                &UpdateMedicalCondition {
                    severity: Some(Severity::Severe),
                    notes: Some("monitor daily".to_string()),
                    ..UpdateMedicalCondition::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.severity, Severity::Severe);
        assert_eq!(updated.notes, "monitor daily");

        assert!(db.get_condition(other.id, cond.id).unwrap().is_none());
        assert!(!db.delete_condition(other.id, cond.id).unwrap());
        assert!(db.delete_condition(user.id, cond.id).unwrap());
        assert!(db.list_conditions(user.id).unwrap().is_empty());
    }

    #[test]
    fn test_preferences_auto_created_and_updated() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user(&db, "a@example.com");
        assert!(db.get_preferences(user.id).unwrap().is_none());

        let prefs = db.get_or_create_preferences(user.id).unwrap();
        assert_eq!(prefs.dietary_type, DietaryType::None);
        assert!(prefs.allergies.is_empty());
        assert_eq!(count(&db, "user_preferences"), 1);
        db.get_or_create_preferences(user.id).unwrap();
        assert_eq!(count(&db, "user_preferences"), 1);

        let prefs = db
            .update_preferences(
                user.id,
                &UpdatePreferences {
                    dietary_type: Some(DietaryType::Vegan),
                    allergies: Some(vec!["peanuts".to_string(), "soy".to_string()]),
                    ..UpdatePreferences::default()
                },
            )
            .unwrap();
        assert_eq!(prefs.dietary_type, DietaryType::Vegan);
        assert_eq!(prefs.allergies, vec!["peanuts", "soy"]);
        assert!(prefs.preferred_cuisines.is_empty());
    }

    #[test]
    fn test_goal_crud_and_active_goal() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user(&db, "a@example.com");
        assert!(db.get_active_goal(user.id).unwrap().is_none());

        let first = db
            .create_goal(
                user.id,
                &NewDietGoal {
                    goal_type: GoalType::LoseWeight,
                    target_weight: Some(65.0),
                    target_date: NaiveDate::from_ymd_opt(2026, 12, 31),
                    calorie_target: 1800,
                    is_active: true,
                },
            )
            .unwrap();
        assert_eq!(first.goal_type_display, "Lose Weight");
        assert_eq!(first.target_date.as_deref(), Some("2026-12-31"));

        let second = db
            .create_goal(
                user.id,
                &NewDietGoal {
                    goal_type: GoalType::MuscleGain,
                    target_weight: None,
                    target_date: None,
                    calorie_target: 2800,
                    is_active: true,
                },
            )
            .unwrap();
        assert_eq!(db.get_active_goal(user.id).unwrap().unwrap().id, second.id);
        assert_eq!(db.list_goals(user.id).unwrap()[0].id, second.id);

        db.update_goal(
            user.id,
            second.id,
            &UpdateDietGoal {
                is_active: Some(false),
                target_weight: Some(Some(90.0)),
                ..UpdateDietGoal::default()
            },
        )
        .unwrap()
        .unwrap();
        assert_eq!(db.get_active_goal(user.id).unwrap().unwrap().id, first.id);

        let cleared = db
            .update_goal(
                user.id,
                first.id,
                &UpdateDietGoal {
                    target_date: Some(None),
                    ..UpdateDietGoal::default()
                },
            )
            .unwrap()
            .unwrap();
        assert!(cleared.target_date.is_none());

        assert!(db.delete_goal(user.id, first.id).unwrap());
        assert!(db.get_goal(user.id, first.id).unwrap().is_none());
    }

    #[test]
    fn test_ingredient_listing_and_search() {
        let db = Database::open_in_memory().unwrap();
        db.insert_ingredient(&sample_ingredient("Tofu", 76.0)).unwrap();
        db.insert_ingredient(&NewIngredient {
            category: IngredientCategory::Grains,
            ..sample_ingredient("Brown Rice", 111.0)
        })
        .unwrap();
        db.insert_ingredient(&sample_ingredient("100% Whey", 400.0))
            .unwrap();

        let all = db.all_ingredients().unwrap();
        let names: Vec<&str> = all.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["100% Whey", "Brown Rice", "Tofu"]);
        assert_eq!(all[2].common_allergens, vec!["dairy"]);

        let found = db.list_ingredients(Some("RICE"), None).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Brown Rice");

        let found = db.list_ingredients(Some("%"), None).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "100% Whey");

        let grains = db
            .list_ingredients(None, Some(IngredientCategory::Grains))
            .unwrap();
        assert_eq!(grains.len(), 1);
        assert!(
            db.list_ingredients(Some("tofu"), Some(IngredientCategory::Grains))
                .unwrap()
                .is_empty()
        );
        assert_eq!(db.list_ingredients(Some(""), None).unwrap().len(), 3);
    }

    #[test]
    fn test_upsert_ingredient_by_name() {
        let db = Database::open_in_memory().unwrap();
        let (first, created) = db
            .upsert_ingredient_by_name(&sample_ingredient("Tofu", 76.0))
            .unwrap();
        assert!(created);
        let (second, created) = db
            .upsert_ingredient_by_name(&sample_ingredient("Tofu", 999.0))
            .unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert!((second.calories_per_100g - 76.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_negative_macro_rejected() {
        let db = Database::open_in_memory().unwrap();
        assert!(
            db.insert_ingredient(&sample_ingredient("Bad", -1.0))
                .is_err()
        );
    }

    #[test]
    fn test_create_plan_with_items_derives_macros() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user(&db, "a@example.com");
        let ing = db
            .insert_ingredient(&sample_ingredient("Chicken", 200.0))
            .unwrap();

        let detail = db
            .create_plan_with_items(
                user.id,
                &plan(None),
                &[item(ing.id, 150.0, MealType::Lunch, 0)],
            )
            .unwrap();
        assert_eq!(detail.plan.total_calories, 2628);
        assert!((detail.plan.total_protein - 164.0).abs() < f64::EPSILON);
        assert_eq!(detail.items.len(), 1);
        let line = &detail.items[0];
        assert!((line.calories - 300.0).abs() < f64::EPSILON);
        assert!((line.protein - 30.0).abs() < f64::EPSILON);
        assert!((line.carbs - 15.0).abs() < f64::EPSILON);
        assert!((line.fat - 7.5).abs() < f64::EPSILON);
        assert_eq!(line.preparation_notes, "");
    }

    #[test]
    fn test_unknown_ingredient_rolls_back_everything() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user(&db, "a@example.com");
        let ing = db.insert_ingredient(&sample_ingredient("Oats", 389.0)).unwrap();

        let err = db
            .create_plan_with_items(
                user.id,
                &plan(None),
                &[
                    item(ing.id, 80.0, MealType::Breakfast, 0),
                    item(9999, 100.0, MealType::Lunch, 0),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, PipelineError::IngredientNotFound(9999)));
        assert_eq!(count(&db, "diet_plans"), 0);
        assert_eq!(count(&db, "diet_plan_items"), 0);
    }

    #[test]
    fn test_non_positive_quantity_is_persistence_error() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user(&db, "a@example.com");
        let ing = db.insert_ingredient(&sample_ingredient("Oats", 389.0)).unwrap();

        let err = db
            .create_plan_with_items(
                user.id,
                &plan(None),
                &[
                    item(ing.id, 50.0, MealType::Breakfast, 0),
                    item(ing.id, 0.0, MealType::Snack, 1),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, PipelineError::Persistence(_)));
        assert_eq!(count(&db, "diet_plans"), 0);
        assert_eq!(count(&db, "diet_plan_items"), 0);
    }

    #[test]
    fn test_plan_items_ordered_by_meal_then_index() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user(&db, "a@example.com");
        let ing = db.insert_ingredient(&sample_ingredient("Oats", 389.0)).unwrap();

        let detail = db
            .create_plan_with_items(
                user.id,
                &plan(None),
                &[
                    item(ing.id, 10.0, MealType::Snack, 0),
                    item(ing.id, 20.0, MealType::Dinner, 0),
                    item(ing.id, 30.0, MealType::Breakfast, 1),
                    item(ing.id, 40.0, MealType::Breakfast, 0),
                    item(ing.id, 50.0, MealType::Lunch, 0),
                ],
            )
            .unwrap();
        let grams: Vec<f64> = detail.items.iter().map(|i| i.quantity_grams).collect();
        assert_eq!(grams, vec![40.0, 30.0, 50.0, 20.0, 10.0]);
    }

    #[test]
    fn test_plans_are_scoped_and_cascade() {
        let db = Database::open_in_memory().unwrap();
        let owner = sample_user(&db, "a@example.com");
        let other = sample_user(&db, "b@example.com");
        let ing = db.insert_ingredient(&sample_ingredient("Oats", 389.0)).unwrap();
        let detail = db
            .create_plan_with_items(
                owner.id,
                &plan(None),
                &[item(ing.id, 80.0, MealType::Breakfast, 0)],
            )
            .unwrap();

        assert!(db.get_plan(other.id, detail.plan.id).unwrap().is_none());
        assert!(db.list_plans(other.id).unwrap().is_empty());
        assert!(!db.delete_plan(other.id, detail.plan.id).unwrap());

        assert!(db.delete_plan(owner.id, detail.plan.id).unwrap());
        assert_eq!(count(&db, "diet_plan_items"), 0);
    }

    #[test]
    fn test_goal_delete_unlinks_plan() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user(&db, "a@example.com");
        let goal = db
            .create_goal(
                user.id,
                &NewDietGoal {
                    goal_type: GoalType::Maintain,
                    target_weight: None,
                    target_date: None,
                    calorie_target: 2200,
                    is_active: true,
                },
            )
            .unwrap();
        let detail = db.insert_plan(user.id, &plan(Some(goal.id))).unwrap();
        assert_eq!(detail.plan.goal, Some(goal.id));
        assert!(detail.items.is_empty());

        db.delete_goal(user.id, goal.id).unwrap();
        let reloaded = db.get_plan(user.id, detail.plan.id).unwrap().unwrap();
        assert_eq!(reloaded.plan.goal, None);
    }

    #[test]
    fn test_update_plan_and_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user(&db, "a@example.com");
        let first = db.insert_plan(user.id, &plan(None)).unwrap();
        let second = db
            .insert_plan(
                user.id,
                &NewDietPlan {
                    targets: NutritionTargets::PLACEHOLDER,
                    ..plan(None)
                },
            )
            .unwrap();

        let plans = db.list_plans(user.id).unwrap();
        assert_eq!(plans[0].id, second.plan.id);
        assert_eq!(plans[1].id, first.plan.id);
        assert_eq!(plans[0].total_calories, 2000);

        let updated = db
            .update_plan(
                user.id,
                first.plan.id,
                &UpdateDietPlan {
                    is_favorite: Some(true),
                    plan_name: Some("Renamed".to_string()),
                    ..UpdateDietPlan::default()
                },
            )
            .unwrap()
            .unwrap();
        assert!(updated.plan.is_favorite);
        assert_eq!(updated.plan.plan_name, "Renamed");
        assert_eq!(updated.plan.ai_description, "A balanced day");
    }
}
